use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::ProfilePatch;

/// Display fields only. Email and password are changed through their own flows.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(max = 100))]
    pub username: Option<String>,
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub surname: Option<String>,
    #[validate(length(max = 100))]
    pub patronymic: Option<String>,
    #[validate(length(max = 100))]
    #[schema(example = "avatar-42")]
    pub avatar_id: Option<String>,
}

impl From<UpdateProfileRequest> for ProfilePatch {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            username: req.username,
            name: req.name,
            surname: req.surname,
            patronymic: req.patronymic,
            avatar_id: req.avatar_id,
        }
    }
}
