use crate::models::models::{Post, Review, User};

/// What the current viewer may do with a post and its reviews.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub is_admin: bool,
    pub is_post_owner: bool,
    pub has_user_reviewed: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_validate: bool,
    pub can_review: bool,
}

impl Permissions {
    pub fn compute(user: Option<&User>, post: &Post, reviews: &[Review]) -> Self {
        let Some(user) = user else {
            return Self::default();
        };

        let is_admin = user.is_admin;
        let is_post_owner = user.id == post.user_id;
        let has_user_reviewed = reviews.iter().any(|r| r.user_id == user.id);

        Self {
            is_admin,
            is_post_owner,
            has_user_reviewed,
            can_edit: is_post_owner,
            can_delete: is_admin || is_post_owner,
            can_validate: is_admin && !post.validated,
            can_review: post.validated && !has_user_reviewed,
        }
    }
}

pub fn can_edit_review(user: Option<&User>, review: &Review) -> bool {
    user.is_some_and(|u| u.id == review.user_id)
}

pub fn can_delete_review(user: Option<&User>, review: &Review) -> bool {
    user.is_some_and(|u| u.is_admin || u.id == review.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, is_admin: bool) -> User {
        User {
            id: id.to_string(),
            name: format!("user-{id}"),
            is_admin,
        }
    }

    fn post(owner: &str, validated: bool) -> Post {
        Post {
            id: "p1".to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            image: None,
            user_id: owner.to_string(),
            user_name: "owner".to_string(),
            user_is_admin: false,
            validated,
            created_at: String::new(),
        }
    }

    fn review(id: &str, author: &str) -> Review {
        Review {
            id: id.to_string(),
            post_id: "p1".to_string(),
            user_id: author.to_string(),
            user_name: None,
            rating: 4,
            comment: "bien".to_string(),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_anonymous_viewer_has_no_permissions() {
        assert_eq!(Permissions::compute(None, &post("1", true), &[]), Permissions::default());
    }

    #[test]
    fn test_owner_can_edit_and_delete_but_not_validate() {
        let perms = Permissions::compute(Some(&user("1", false)), &post("1", false), &[]);
        assert!(perms.is_post_owner);
        assert!(perms.can_edit);
        assert!(perms.can_delete);
        assert!(!perms.can_validate);
        assert!(!perms.can_review);
    }

    #[test]
    fn test_admin_validates_only_pending_posts() {
        let admin = user("9", true);
        let pending = Permissions::compute(Some(&admin), &post("1", false), &[]);
        assert!(pending.can_validate);
        assert!(pending.can_delete);
        assert!(!pending.can_edit);

        let validated = Permissions::compute(Some(&admin), &post("1", true), &[]);
        assert!(!validated.can_validate);
    }

    #[test]
    fn test_review_allowed_once_on_validated_post() {
        let viewer = user("2", false);
        let open = Permissions::compute(Some(&viewer), &post("1", true), &[review("r1", "3")]);
        assert!(open.can_review);
        assert!(!open.has_user_reviewed);

        let done = Permissions::compute(Some(&viewer), &post("1", true), &[review("r1", "2")]);
        assert!(done.has_user_reviewed);
        assert!(!done.can_review);
    }

    #[test]
    fn test_review_ownership_rules() {
        let r = review("r1", "2");
        assert!(can_edit_review(Some(&user("2", false)), &r));
        assert!(!can_edit_review(Some(&user("9", true)), &r));
        assert!(can_delete_review(Some(&user("9", true)), &r));
        assert!(!can_delete_review(Some(&user("3", false)), &r));
        assert!(!can_delete_review(None, &r));
    }
}
