// src/handlers/mod.rs

pub mod exams;
pub mod knowledge_points;
pub mod question_bank;
