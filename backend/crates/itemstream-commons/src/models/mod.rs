mod connection_id;
mod identity;
mod mutation;
mod schema;

pub use connection_id::ConnectionId;
pub use identity::Identity;
pub use mutation::MutationAction;
pub use schema::Schema;
