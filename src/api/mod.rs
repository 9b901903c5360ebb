// API module
//
// HTTP surface of the node: chain, pool and wallet endpoints, plus the
// ingress peers use to gossip chains and transactions, and the startup sync
// of a peer with the root node

pub mod handlers;
pub mod routes;
pub mod sync;

pub use routes::configure_routes;
