use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
};

impl Repository {
    pub async fn list_categories(&self) -> Result<Vec<entities::Category>, RestError> {
        Ok(self
            .db
            .list_categories()
            .await?
            .iter()
            .map(|category| category.get_entity())
            .collect())
    }
}
