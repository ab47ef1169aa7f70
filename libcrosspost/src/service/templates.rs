//! Description template service
//!
//! Reusable description snippets. Storage sits behind [`TemplateRepository`];
//! the in-memory repository is the only one shipped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use super::events::{Event, EventBus};
use crate::error::{CrosspostError, Result};

/// A stored description template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionTemplate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Body inserted into a submission description
    pub content: String,
}

/// Fields for creating a template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<DescriptionTemplate>>;

    async fn find_all(&self) -> Result<Vec<DescriptionTemplate>>;

    async fn save(&self, template: DescriptionTemplate) -> Result<()>;

    /// Returns whether a template was removed
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryTemplateRepository {
    templates: RwLock<HashMap<String, DescriptionTemplate>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn find(&self, id: &str) -> Result<Option<DescriptionTemplate>> {
        Ok(self.templates.read().await.get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<DescriptionTemplate>> {
        Ok(self.templates.read().await.values().cloned().collect())
    }

    async fn save(&self, template: DescriptionTemplate) -> Result<()> {
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.templates.write().await.remove(id).is_some())
    }
}

/// Template service
///
/// CRUD over a repository, emitting an event for each change.
#[derive(Clone)]
pub struct DescriptionTemplateService {
    repository: Arc<dyn TemplateRepository>,
    event_bus: EventBus,
}

impl DescriptionTemplateService {
    pub fn new(repository: Arc<dyn TemplateRepository>, event_bus: EventBus) -> Self {
        Self {
            repository,
            event_bus,
        }
    }

    /// Get a template by id
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no template has this id.
    pub async fn get(&self, id: &str) -> Result<DescriptionTemplate> {
        self.repository.find(id).await?.ok_or_else(|| {
            CrosspostError::NotFound(format!("Description template {} could not be found", id))
        })
    }

    /// All templates, ordered by title then id
    pub async fn list(&self) -> Result<Vec<DescriptionTemplate>> {
        let mut templates = self.repository.find_all().await?;
        templates.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(templates)
    }

    /// Create a template with a fresh id
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the title is blank.
    pub async fn create(&self, template: NewTemplate) -> Result<DescriptionTemplate> {
        if template.title.trim().is_empty() {
            return Err(CrosspostError::InvalidInput(
                "Description template title cannot be empty".to_string(),
            ));
        }

        let created = DescriptionTemplate {
            id: uuid::Uuid::new_v4().to_string(),
            title: template.title,
            description: template.description,
            content: template.content,
        };
        self.repository.save(created.clone()).await?;

        info!("Created description template {}", created.id);
        self.event_bus.emit(Event::TemplateCreated {
            id: created.id.clone(),
        });
        Ok(created)
    }

    /// Replace an existing template
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no template has this id.
    pub async fn update(&self, template: DescriptionTemplate) -> Result<DescriptionTemplate> {
        if self.repository.find(&template.id).await?.is_none() {
            return Err(CrosspostError::NotFound(format!(
                "Description template {} does not exist",
                template.id
            )));
        }

        self.repository.save(template.clone()).await?;
        self.event_bus.emit(Event::TemplateUpdated {
            id: template.id.clone(),
        });
        Ok(template)
    }

    /// Remove a template; removing a missing id is not an error
    pub async fn remove(&self, id: &str) -> Result<()> {
        if self.repository.delete(id).await? {
            info!("Removed description template {}", id);
        }
        self.event_bus
            .emit(Event::TemplateRemoved { id: id.to_string() });
        Ok(())
    }
}
