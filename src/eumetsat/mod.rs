//! Access to the EUMETSAT Data Store: token handling, product search, product
//! entry listing and entry download.
mod datastore;
mod token;

pub use datastore::{Collection, DataStore, Product};
pub use token::AccessToken;
