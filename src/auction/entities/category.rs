use {
    time::OffsetDateTime,
    uuid::Uuid,
};

pub type CategoryId = Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    pub id:          CategoryId,
    pub name:        String,
    pub description: Option<String>,
    pub created_at:  OffsetDateTime,
}
