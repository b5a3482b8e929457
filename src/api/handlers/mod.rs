pub mod agents;
pub mod health;
pub mod tasks;
pub mod ws;
