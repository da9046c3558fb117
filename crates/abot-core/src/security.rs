use crate::domain::UserId;

/// Only listed users may use the bot; an empty list admits nobody.
pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if allowed_users.is_empty() {
        return false;
    }
    allowed_users.contains(&user_id.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_users_are_authorized() {
        assert!(is_authorized(Some(UserId(42)), &[1, 42]));
        assert!(!is_authorized(Some(UserId(7)), &[1, 42]));
    }

    #[test]
    fn missing_user_or_empty_list_is_rejected() {
        assert!(!is_authorized(None, &[1]));
        assert!(!is_authorized(Some(UserId(1)), &[]));
    }
}
