// src/models/knowledge_point.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Represents the 'knowledge_points' table in the database.
/// `level` is 1 for roots and `parent.level + 1` otherwise at write time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgePoint {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub level: i32,
    /// Position among siblings, appended at the end on create.
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Knowledge point with nested children, as returned by tree reads.
/// Children are only populated by `tree`; other reads leave them empty.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgePointNode {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub level: i32,
    pub sort_order: i32,
    pub children: Vec<KnowledgePointNode>,
}

impl From<KnowledgePoint> for KnowledgePointNode {
    fn from(kp: KnowledgePoint) -> Self {
        Self {
            id: kp.id,
            name: kp.name,
            description: kp.description,
            parent_id: kp.parent_id,
            level: kp.level,
            sort_order: kp.sort_order,
            children: Vec::new(),
        }
    }
}

impl KnowledgePointNode {
    /// Number of levels below this node (0 for a leaf).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// DTO for creating or updating a knowledge point.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct KnowledgePointRequest {
    #[validate(length(min = 1, max = 200, message = "Name length must be between 1 and 200 chars"))]
    pub name: String,
    #[validate(length(max = 500, message = "Description must be at most 500 chars"))]
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}
