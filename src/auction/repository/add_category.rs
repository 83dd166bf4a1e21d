use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
};

impl Repository {
    #[tracing::instrument(skip_all, fields(category_id = %category.id), err(level = tracing::Level::TRACE))]
    pub async fn add_category(&self, category: &entities::Category) -> Result<(), RestError> {
        self.db.add_category(category).await
    }
}
