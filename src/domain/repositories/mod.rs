pub mod broker_client;
