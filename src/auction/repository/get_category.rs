use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
};

impl Repository {
    pub async fn get_category(
        &self,
        category_id: entities::CategoryId,
    ) -> Result<entities::Category, RestError> {
        Ok(self.db.get_category(category_id).await?.get_entity())
    }
}
