// src/services/knowledge_tree.rs

use std::{collections::HashSet, sync::Arc};

use uuid::Uuid;
use validator::Validate;

use crate::{
    config::DEFAULT_TREE_DEPTH,
    error::AppError,
    models::{
        knowledge_point::{KnowledgePoint, KnowledgePointNode, KnowledgePointRequest},
        user::{Caller, Role},
    },
    repositories::KnowledgeStore,
    services::clock::Clock,
    utils::html::clean_html,
};

/// Maintains the forest of knowledge points that questions are tagged with.
#[derive(Clone)]
pub struct KnowledgeTreeManager {
    store: Arc<dyn KnowledgeStore>,
    clock: Arc<dyn Clock>,
    /// Levels of descendants materialized by `tree`.
    tree_depth: usize,
}

impl KnowledgeTreeManager {
    pub fn new(store: Arc<dyn KnowledgeStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            tree_depth: DEFAULT_TREE_DEPTH,
        }
    }

    pub fn with_tree_depth(mut self, depth: usize) -> Self {
        self.tree_depth = depth;
        self
    }

    async fn load(&self, id: Uuid) -> Result<KnowledgePoint, AppError> {
        self.store
            .find_knowledge_point(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Knowledge point not found".to_string()))
    }

    async fn load_parent(&self, parent_id: Uuid) -> Result<KnowledgePoint, AppError> {
        self.store
            .find_knowledge_point(parent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Parent knowledge point does not exist".to_string()))
    }

    pub async fn create(
        &self,
        req: KnowledgePointRequest,
        caller: &Caller,
    ) -> Result<KnowledgePointNode, AppError> {
        caller.require_staff()?;
        req.validate()?;

        let level = match req.parent_id {
            Some(parent_id) => self.load_parent(parent_id).await?.level + 1,
            None => 1,
        };

        let sort_order = self
            .store
            .max_sort_order(req.parent_id)
            .await?
            .unwrap_or(0)
            + 1;

        let now = self.clock.now();
        let kp = KnowledgePoint {
            id: Uuid::new_v4(),
            name: clean_html(&req.name),
            description: req.description.as_deref().map(clean_html),
            parent_id: req.parent_id,
            level,
            sort_order,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_knowledge_point(&kp).await?;
        tracing::info!("Knowledge point {} created at level {}", kp.id, kp.level);

        Ok(kp.into())
    }

    /// Renames a node and, when the parent changes, moves it.
    ///
    /// Only the moved node's level is recomputed; its descendants keep the
    /// levels they had.
    pub async fn update(
        &self,
        id: Uuid,
        req: KnowledgePointRequest,
        caller: &Caller,
    ) -> Result<KnowledgePointNode, AppError> {
        caller.require_staff()?;
        req.validate()?;

        let mut kp = self.load(id).await?;

        if req.parent_id != kp.parent_id {
            kp.level = match req.parent_id {
                Some(parent_id) => {
                    if parent_id == id {
                        return Err(AppError::InvalidOperation(
                            "A knowledge point cannot be its own parent".to_string(),
                        ));
                    }
                    let parent = self.load_parent(parent_id).await?;
                    if self.is_descendant(id, parent_id).await? {
                        return Err(AppError::InvalidOperation(
                            "Cannot move a knowledge point under its own descendant".to_string(),
                        ));
                    }
                    parent.level + 1
                }
                None => 1,
            };
            tracing::info!("Knowledge point {} moved from {:?} to {:?}", id, kp.parent_id, req.parent_id);
            kp.parent_id = req.parent_id;
        }

        kp.name = clean_html(&req.name);
        kp.description = req.description.as_deref().map(clean_html);
        kp.updated_at = self.clock.now();

        self.store.update_knowledge_point(&kp).await?;
        Ok(kp.into())
    }

    /// Soft-deletes a leaf that no question references.
    pub async fn delete(&self, id: Uuid, caller: &Caller) -> Result<(), AppError> {
        if caller.role != Role::Admin {
            return Err(AppError::Forbidden("Admin role required".to_string()));
        }

        self.load(id).await?;

        if self.store.count_children(id).await? > 0 {
            return Err(AppError::Conflict(
                "Knowledge point has children and cannot be deleted".to_string(),
            ));
        }

        if self.store.count_question_links(id).await? > 0 {
            return Err(AppError::Conflict(
                "Knowledge point is linked to questions and cannot be deleted".to_string(),
            ));
        }

        self.store
            .soft_delete_knowledge_point(id, self.clock.now())
            .await?;
        tracing::info!("Knowledge point {} deleted by {}", id, caller.user_id);
        Ok(())
    }

    /// Single node, children left empty.
    pub async fn get_by_id(&self, id: Uuid) -> Result<KnowledgePointNode, AppError> {
        Ok(self.load(id).await?.into())
    }

    pub async fn get_all(&self) -> Result<Vec<KnowledgePointNode>, AppError> {
        let all = self.store.list_knowledge_points().await?;
        Ok(all.into_iter().map(Into::into).collect())
    }

    pub async fn roots(&self) -> Result<Vec<KnowledgePointNode>, AppError> {
        let roots = self.store.list_children(None).await?;
        Ok(roots.into_iter().map(Into::into).collect())
    }

    pub async fn children(&self, parent_id: Uuid) -> Result<Vec<KnowledgePointNode>, AppError> {
        self.load(parent_id).await?;
        let children = self.store.list_children(Some(parent_id)).await?;
        Ok(children.into_iter().map(Into::into).collect())
    }

    /// The node with its descendants nested up to the configured depth.
    /// Anything deeper is cut off. Reads one level per query.
    pub async fn tree(&self, id: Uuid) -> Result<KnowledgePointNode, AppError> {
        let mut tree: KnowledgePointNode = self.load(id).await?.into();

        // (id, path from the root) of every node on the deepest level so far.
        let mut frontier: Vec<(Uuid, Vec<usize>)> = vec![(tree.id, Vec::new())];

        for _ in 0..self.tree_depth {
            let ids: Vec<Uuid> = frontier.iter().map(|(id, _)| *id).collect();
            let children = self.store.children_of(&ids).await?;
            if children.is_empty() {
                break;
            }

            let mut next = Vec::with_capacity(children.len());
            for (parent_id, path) in &frontier {
                let node = node_at(&mut tree, path);
                for child in children.iter().filter(|c| c.parent_id == Some(*parent_id)) {
                    let mut child_path = path.clone();
                    child_path.push(node.children.len());
                    next.push((child.id, child_path));
                    node.children.push(child.clone().into());
                }
            }
            frontier = next;
        }

        Ok(tree)
    }

    /// Whether `node_id` sits somewhere below `ancestor_id`.
    ///
    /// Walks the parent chain of `node_id` until it meets `ancestor_id` or a
    /// root. A chain that loops back on itself ends the walk.
    pub async fn is_descendant(&self, ancestor_id: Uuid, node_id: Uuid) -> Result<bool, AppError> {
        let mut seen = HashSet::new();
        let mut current = self.store.find_knowledge_point(node_id).await?;

        while let Some(node) = current {
            if !seen.insert(node.id) {
                tracing::error!("Knowledge point parent chain loops at {}", node.id);
                return Ok(false);
            }
            match node.parent_id {
                Some(parent_id) if parent_id == ancestor_id => return Ok(true),
                Some(parent_id) => {
                    current = self.store.find_knowledge_point(parent_id).await?;
                }
                None => return Ok(false),
            }
        }

        Ok(false)
    }

    pub async fn link_question(&self, id: Uuid, question_id: Uuid, caller: &Caller) -> Result<(), AppError> {
        caller.require_staff()?;
        self.load(id).await?;
        if !self.store.question_exists(question_id).await? {
            return Err(AppError::NotFound("Question not found".to_string()));
        }
        self.store.link_question(id, question_id).await
    }

    pub async fn unlink_question(&self, id: Uuid, question_id: Uuid, caller: &Caller) -> Result<(), AppError> {
        caller.require_staff()?;
        self.load(id).await?;
        if !self.store.question_exists(question_id).await? {
            return Err(AppError::NotFound("Question not found".to_string()));
        }
        if !self.store.unlink_question(id, question_id).await? {
            return Err(AppError::NotFound(
                "Question is not linked to this knowledge point".to_string(),
            ));
        }
        Ok(())
    }
}

fn node_at<'a>(root: &'a mut KnowledgePointNode, path: &[usize]) -> &'a mut KnowledgePointNode {
    path.iter().fold(root, |node, &i| &mut node.children[i])
}
