use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized};
use futures::future::{Ready, ready};

/// Authenticated caller, placed in request extensions by `auth_middleware`
/// and handed explicitly to every protected handler.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Teacher id for teachers, student id for students
    pub profile_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ErrorUnauthorized("Missing token")),
        )
    }
}

impl AuthUser {
    pub fn require_staff(&self) -> actix_web::Result<()> {
        if matches!(self.role, Role::Admin | Role::Teacher) {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Teacher/Admin only"))
        }
    }

    /// Returns true if the user is a student
    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    /// Teacher id recorded as `marked_by`; admins mark anonymously.
    pub fn teacher_id(&self) -> Option<u64> {
        match self.role {
            Role::Teacher => self.profile_id,
            _ => None,
        }
    }

    /// Students may only read their own records.
    pub fn require_self_or_staff(&self, student_id: u64) -> actix_web::Result<()> {
        if !self.is_student() || self.profile_id == Some(student_id) {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden(
                "You can only view your own attendance report.",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, profile_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            profile_id,
        }
    }

    #[test]
    fn staff_guard_admits_admins_and_teachers_only() {
        assert!(user(Role::Admin, None).require_staff().is_ok());
        assert!(user(Role::Teacher, Some(2)).require_staff().is_ok());
        assert!(user(Role::Student, Some(3)).require_staff().is_err());
    }

    #[test]
    fn students_only_see_themselves() {
        let student = user(Role::Student, Some(3));
        assert!(student.require_self_or_staff(3).is_ok());
        assert!(student.require_self_or_staff(4).is_err());
        assert!(user(Role::Teacher, Some(2)).require_self_or_staff(4).is_ok());
    }

    #[test]
    fn only_teachers_are_recorded_as_marker() {
        assert_eq!(user(Role::Teacher, Some(2)).teacher_id(), Some(2));
        assert_eq!(user(Role::Admin, Some(2)).teacher_id(), None);
    }
}
