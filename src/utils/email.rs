use validator::ValidateEmail;

use crate::errors::AccountsError;

/// Lowercases the domain part of an address, leaving the mailbox as typed.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Normalizes the address and rejects it unless it is a valid email.
pub fn validated_email(email: &str) -> Result<String, AccountsError> {
    let email = normalize_email(email);
    if !email.validate_email() {
        return Err(AccountsError::Validation(format!(
            "`{email}` is not a valid email address"
        )));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_domain_only() {
        assert_eq!(normalize_email("Jane.Doe@Example.COM"), "Jane.Doe@example.com");
        assert_eq!(normalize_email("  a@X.com "), "a@x.com");
    }

    #[test]
    fn normalize_leaves_addresses_without_at_alone() {
        assert_eq!(normalize_email("not-an-email"), "not-an-email");
    }

    #[test]
    fn validated_email_normalizes_first() {
        assert_eq!(validated_email(" Ada@Example.COM ").unwrap(), "Ada@example.com");
    }

    #[test]
    fn validated_email_rejects_malformed_addresses() {
        for bad in ["", "nope", "@x.com", "a@@x.com", "a b@x.com"] {
            assert!(
                matches!(validated_email(bad), Err(AccountsError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
