use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};

/// Permits a mutation only when `actor` owns the resource.
pub fn ensure_owner(actor: Uuid, owner: Uuid, resource: &str) -> ServiceResult<()> {
    if actor == owner {
        Ok(())
    } else {
        Err(ServiceError::forbidden(format!(
            "you are not allowed to modify this {}",
            resource
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_may_mutate() {
        let user = Uuid::new_v4();
        assert!(ensure_owner(user, user, "recipe").is_ok());
    }

    #[test]
    fn non_owner_is_forbidden() {
        let err = ensure_owner(Uuid::new_v4(), Uuid::new_v4(), "comment").unwrap_err();
        match err {
            ServiceError::Forbidden(message) => {
                assert_eq!(message, "you are not allowed to modify this comment")
            }
            other => panic!("expected forbidden, got {other:?}"),
        }
    }
}
