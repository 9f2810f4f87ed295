//! Wish entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Attendance, Wish};
use shared::identity::NameKey;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for wish_attendance that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "wish_attendance", rename_all = "lowercase")]
pub enum AttendanceDb {
    Present,
    Absent,
}

impl From<AttendanceDb> for Attendance {
    fn from(db: AttendanceDb) -> Self {
        match db {
            AttendanceDb::Present => Attendance::Present,
            AttendanceDb::Absent => Attendance::Absent,
        }
    }
}

impl From<Attendance> for AttendanceDb {
    fn from(attendance: Attendance) -> Self {
        match attendance {
            Attendance::Present => AttendanceDb::Present,
            Attendance::Absent => AttendanceDb::Absent,
        }
    }
}

/// Database row mapping for the wishes table.
#[derive(Debug, Clone, FromRow)]
pub struct WishEntity {
    pub id: Uuid,
    pub composite_key: String,
    pub invitation_id: String,
    pub name: String,
    pub name_key: String,
    pub message: String,
    pub attendance: Option<AttendanceDb>,
    pub created_at: DateTime<Utc>,
}

impl From<WishEntity> for Wish {
    fn from(entity: WishEntity) -> Self {
        Self {
            id: entity.id,
            invitation_id: entity.invitation_id,
            name: entity.name,
            // Stored keys are already normalized; re-normalizing is a no-op.
            name_key: NameKey::from(entity.name_key),
            message: entity.message,
            attendance: entity.attendance.map(Into::into),
            created_at: Some(entity.created_at),
        }
    }
}
