pub mod courier;
pub mod identity;
pub mod ledger;
pub mod message;
pub mod registry;
