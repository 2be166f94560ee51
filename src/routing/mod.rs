pub mod condition;
pub mod engine;
pub mod master_slave;
pub mod route_result;
pub mod session;

pub use engine::RoutingEngine;
pub use master_slave::MasterSlaveRouter;
pub use route_result::{RouteResult, RoutingUnit, TableUnit};
pub use session::SessionContext;
