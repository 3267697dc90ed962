//! Services layer - business logic
//!
//! Services enforce roles and ownership, validate input and coordinate the
//! repositories and the cache. Each one reports failures through its own
//! error enum, which the API layer maps onto HTTP responses.

pub mod content;
pub mod content_form;
pub mod course;
pub mod enrollment;
pub mod ordering;
pub mod password;
pub mod render;
pub mod subject;
pub mod user;

pub use content::{ContentService, ContentServiceError};
pub use content_form::{ContentForm, KindSpec};
pub use course::{ApiCourse, Catalog, CoursePage, CourseService, CourseServiceError};
pub use enrollment::{EnrollmentError, EnrollmentService, ModuleWithContents, RenderedContent, StudentCourse};
pub use ordering::{OrderReport, OrderStatus, OrderingError, OrderingService};
pub use password::{hash_password, verify_password};
pub use render::MarkdownRenderer;
pub use subject::{generate_slug, SubjectService, SubjectServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
