pub mod catalog;
pub mod client;
pub mod inventory;
pub mod locations;

pub use client::{ShopifyClient, ShopifyError};
