// src/models/mod.rs

pub mod exam;
pub mod exam_attempt;
pub mod knowledge_point;
pub mod paper;
pub mod question;
pub mod shared;
pub mod user;
