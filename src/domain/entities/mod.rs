pub mod lemonsqueezy;
pub mod payment;
pub mod usage;
pub mod user;
pub mod webhook;
