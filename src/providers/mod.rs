//! Concrete payload sources

pub mod bus;
pub mod feed;

pub use bus::BusSource;
pub use feed::FeedSource;
