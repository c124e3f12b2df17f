//! Deployment module

pub mod deployer;
pub mod fsm;
pub mod git;
pub mod health;
pub mod orchestrator;
pub mod process;
pub mod rollback;
