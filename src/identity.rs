/// Supplies the signed-in user, if any.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<String>);

impl StaticIdentity {
    pub fn signed_in(username: impl Into<String>) -> Self {
        Self(Some(username.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<String> {
        self.0.clone().filter(|name| !name.trim().is_empty())
    }
}

/// Reads the username from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvIdentity {
    var: String,
}

impl EnvIdentity {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl IdentityProvider for EnvIdentity {
    fn current_user(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .filter(|name| !name.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_username_counts_as_signed_out() {
        assert_eq!(StaticIdentity::signed_in("  ").current_user(), None);
        assert_eq!(StaticIdentity::anonymous().current_user(), None);
        assert_eq!(
            StaticIdentity::signed_in("farmer").current_user().as_deref(),
            Some("farmer")
        );
    }

    #[test]
    fn unset_env_var_is_signed_out() {
        let identity = EnvIdentity::new("VITALIS_TEST_USER_THAT_IS_NEVER_SET");
        assert_eq!(identity.current_user(), None);
    }
}
