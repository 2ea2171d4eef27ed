pub mod approvals_service;
pub mod auth_service;
pub mod claims_service;
pub mod items_service;
pub mod notifications_service;
pub mod student_items_service;
pub mod vision_service;

pub use approvals_service::ApprovalsService;
pub use auth_service::AuthService;
pub use claims_service::ClaimsService;
pub use items_service::ItemsService;
pub use notifications_service::NotificationsService;
pub use student_items_service::StudentItemsService;
pub use vision_service::VisionService;
