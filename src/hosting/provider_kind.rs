use strum::{Display, EnumIter};

/// Code-hosting service a repository lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum ProviderKind {
    #[strum(to_string = "GitHub")]
    GitHub,
    #[strum(to_string = "GitLab")]
    GitLab,
}

impl ProviderKind {
    /// Host name the provider's repository URLs use
    #[must_use]
    pub const fn host(self) -> &'static str {
        match self {
            Self::GitHub => "github.com",
            Self::GitLab => "gitlab.com",
        }
    }
}
