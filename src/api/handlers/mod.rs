pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::login;

pub mod session;
pub use self::session::{logout, session};

pub mod types;
