use {
    super::Service,
    crate::{
        api::RestError,
        auction::entities,
    },
    time::OffsetDateTime,
    uuid::Uuid,
};

const MAX_CATEGORY_NAME_LENGTH: usize = 100;
const MAX_CATEGORY_DESCRIPTION_LENGTH: usize = 500;

pub struct CreateCategoryInput {
    pub name:        String,
    pub description: Option<String>,
}

impl Service {
    #[tracing::instrument(skip_all, err(level = tracing::Level::TRACE))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<entities::Category, RestError> {
        let name = input.name.trim().to_string();
        if name.is_empty() || name.len() > MAX_CATEGORY_NAME_LENGTH {
            return Err(RestError::Validation(vec![format!(
                "name must be between 1 and {} characters",
                MAX_CATEGORY_NAME_LENGTH
            )]));
        }
        if input
            .description
            .as_ref()
            .is_some_and(|description| description.len() > MAX_CATEGORY_DESCRIPTION_LENGTH)
        {
            return Err(RestError::Validation(vec![format!(
                "description must be at most {} characters",
                MAX_CATEGORY_DESCRIPTION_LENGTH
            )]));
        }

        let category = entities::Category {
            id: Uuid::new_v4(),
            name,
            description: input.description,
            created_at: OffsetDateTime::now_utc(),
        };
        // Uniqueness of the name is enforced by the store.
        self.repo.add_category(&category).await?;
        Ok(category)
    }

    pub async fn get_category(
        &self,
        category_id: entities::CategoryId,
    ) -> Result<entities::Category, RestError> {
        self.repo.get_category(category_id).await
    }

    pub async fn list_categories(&self) -> Result<Vec<entities::Category>, RestError> {
        self.repo.list_categories().await
    }
}
