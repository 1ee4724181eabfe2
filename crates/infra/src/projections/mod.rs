//! Read models built by folding committed events.

pub mod client_applications;

pub use client_applications::ClientApplicationView;
