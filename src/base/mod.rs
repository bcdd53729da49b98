pub mod attachment;
pub mod case;
pub mod office;
pub mod staff;

pub use attachment::{Attachment, AttachmentKind};
pub use case::{ApprovalStatus, Case, CaseDraft, CaseFilter, CasePatch, StatusScope};
pub use office::OfficeSettings;
pub use staff::{Actor, Role, StaffMember};
