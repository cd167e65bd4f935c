//! User-visible notices raised by the API gateway.

/// One-shot notices shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The server answered 403: the user is signed in but not allowed.
    PermissionDenied,
}

impl Notice {
    /// Text shown to the user.
    pub fn message(&self) -> &'static str {
        match self {
            Notice::PermissionDenied => "You do not have permission to perform this action",
        }
    }
}

/// Port for surfacing notices to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}
