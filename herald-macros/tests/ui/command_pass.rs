use herald_core::message::{Command, Message, MessageKind, Request};
use herald_macros::command;

#[command]
struct Archive {
    id: u64,
}

#[command(response = u64, name = "order.create")]
#[derive(Clone, PartialEq)]
struct CreateOrder {
    sku: String,
}

fn assert_command<C: Command + Request>() {}

fn main() {
    assert_command::<Archive>();
    assert_command::<CreateOrder>();

    assert_eq!(Archive::NAME, "Archive");
    assert_eq!(CreateOrder::NAME, "order.create");
    assert_eq!(CreateOrder::KIND, MessageKind::Command);

    let _: <Archive as Message>::Response = ();
    let _: <CreateOrder as Message>::Response = 7u64;

    let a = Archive { id: 1 };
    let _ = format!("{:?}", a.clone());
    let o = CreateOrder { sku: "x".into() };
    assert!(o.clone() == o);
}
