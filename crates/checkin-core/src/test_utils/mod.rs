pub mod mock_service;

pub use mock_service::MockService;
