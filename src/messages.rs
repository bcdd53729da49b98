//! User-facing strings. The error kind decides the status code and what gets
//! logged; the strings here are only for display.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ar,
    En,
}

impl Locale {
    /// Picks the first supported language tag of an `Accept-Language` header.
    pub fn from_accept_language(header: &str) -> Option<Locale> {
        header
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(|tag| tag.trim().to_ascii_lowercase())
            .find_map(|tag| match tag.split('-').next() {
                Some("ar") => Some(Locale::Ar),
                Some("en") => Some(Locale::En),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    CaseCreated,
    CaseSubmittedForApproval,
    CaseFetched,
    CaseUpdated,
    CaseDeleted,
    CaseApproved,
    CaseRejected,
    CasesListed,
    RestoreCompleted,
    RestorePartial,
}

pub fn notice(notice: Notice, locale: Locale) -> &'static str {
    use Notice::*;
    match locale {
        Locale::Ar => match notice {
            CaseCreated => "تم إضافة القضية مباشرة",
            CaseSubmittedForApproval => "تم إرسال القضية وفي انتظار الموافقة من المسؤول الرئيسي",
            CaseFetched => "تم جلب القضية",
            CaseUpdated => "تم تحديث القضية بنجاح",
            CaseDeleted => "تم حذف القضية بنجاح",
            CaseApproved => "تم الموافقة على القضية",
            CaseRejected => "تم رفض وحذف القضية",
            CasesListed => "تم جلب القضايا",
            RestoreCompleted => "تمت استعادة النسخة الاحتياطية بنجاح",
            RestorePartial => "تمت استعادة النسخة الاحتياطية جزئيا",
        },
        Locale::En => match notice {
            CaseCreated => "Case added",
            CaseSubmittedForApproval => "Case submitted and awaiting approval",
            CaseFetched => "Case loaded",
            CaseUpdated => "Case updated",
            CaseDeleted => "Case deleted",
            CaseApproved => "Case approved",
            CaseRejected => "Case rejected and removed",
            CasesListed => "Cases loaded",
            RestoreCompleted => "Backup restored",
            RestorePartial => "Backup partially restored",
        },
    }
}

pub fn error_message(kind: ErrorKind, locale: Locale) -> &'static str {
    use ErrorKind::*;
    match locale {
        Locale::Ar => match kind {
            Validation => "البيانات المرسلة غير صالحة",
            NotFound => "القضية غير موجودة",
            Conflict => "تم تعديل القضية من مستخدم آخر، يرجى إعادة المحاولة",
            Duplicate => "السجل موجود بالفعل",
            Unauthorized => "غير مصرح - لا يوجد توكن",
            Forbidden => "غير مصرح لك بهذه العملية",
            Upload => "فشل في رفع الملفات",
            MalformedSnapshot => "ملف النسخة الاحتياطية غير صالح",
            UnsupportedSnapshotVersion => "إصدار النسخة الاحتياطية غير مدعوم",
            EmptyStore => "لا توجد بيانات لإنشاء نسخة احتياطية",
            StoreUnavailable => "قاعدة البيانات غير متاحة حاليا",
            Internal => "حدث خطأ في الخادم",
        },
        Locale::En => match kind {
            Validation => "The submitted data is invalid",
            NotFound => "Case not found",
            Conflict => "The case was changed by someone else, please retry",
            Duplicate => "The record already exists",
            Unauthorized => "Not authenticated",
            Forbidden => "You are not allowed to perform this operation",
            Upload => "Failed to upload files",
            MalformedSnapshot => "The backup file is not valid",
            UnsupportedSnapshotVersion => "The backup file version is not supported",
            EmptyStore => "There is no data to back up",
            StoreUnavailable => "The database is currently unavailable",
            Internal => "Internal server error",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_language_picks_first_supported() {
        assert_eq!(
            Locale::from_accept_language("fr-FR, en-US;q=0.8, ar;q=0.5"),
            Some(Locale::En)
        );
        assert_eq!(Locale::from_accept_language("ar-EG"), Some(Locale::Ar));
        assert_eq!(Locale::from_accept_language("de, fr"), None);
    }

    #[test]
    fn test_messages_differ_per_locale() {
        assert_ne!(
            error_message(ErrorKind::Upload, Locale::Ar),
            error_message(ErrorKind::Upload, Locale::En)
        );
        assert_eq!(notice(Notice::CaseDeleted, Locale::En), "Case deleted");
    }
}
