pub mod account;
pub mod asset;
pub mod bar;
pub mod broker;
pub mod order;
pub mod position;
