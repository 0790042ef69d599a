use herald_core::message::{Message, MessageKind, Signal};
use herald_macros::signal;

#[signal(name = "user.registered")]
struct UserRegistered {
    user_id: u64,
}

#[signal]
struct Tick;

fn assert_signal<S: Signal>() {}

fn main() {
    assert_signal::<UserRegistered>();
    assert_signal::<Tick>();
    assert_eq!(UserRegistered::NAME, "user.registered");
    assert_eq!(Tick::KIND, MessageKind::Signal);
    assert!(!Tick::KIND.is_request());

    let s = UserRegistered { user_id: 1 };
    let _ = format!("{:?}", s.clone());
}
