pub mod alerts;
pub mod dashboard;
pub mod health;
pub mod logs;
pub mod metrics;
pub mod services;
pub mod system;
