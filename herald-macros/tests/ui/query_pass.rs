use herald_core::message::{Message, MessageKind, Query};
use herald_macros::query;

#[query(response = Vec<String>)]
#[derive(serde::Serialize)]
struct ListUsers {
    limit: usize,
}

#[query(response = Option<u32>)]
enum Lookup {
    ById(u32),
    ByName(String),
}

fn assert_query<Q: Query>() {}

fn main() {
    assert_query::<ListUsers>();
    assert_query::<Lookup>();
    assert_eq!(ListUsers::KIND, MessageKind::Query);
    assert_eq!(Lookup::NAME, "Lookup");

    let _: <ListUsers as Message>::Response = vec![String::new()];
    let _ = serde_json_free(&ListUsers { limit: 3 });
    let _ = format!("{:?}", Lookup::ById(1).clone());
    let _ = Lookup::ByName(String::new());
}

fn serde_json_free<T: serde::Serialize>(_: &T) -> bool {
    true
}
