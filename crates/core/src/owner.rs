use std::fs::Metadata;

#[cfg(unix)]
use sysinfo::Users;

/// Resolves the owning user name of a file, where the host has the concept.
pub struct OwnerLookup {
    #[cfg(unix)]
    users: Users,
}

impl OwnerLookup {
    pub fn load() -> Self {
        Self {
            #[cfg(unix)]
            users: Users::new_with_refreshed_list(),
        }
    }

    pub fn is_supported() -> bool {
        cfg!(unix)
    }

    /// `None` means ownership cannot be determined on this platform.
    /// A uid without a user entry resolves to its numeric form.
    #[cfg(unix)]
    pub fn owner_of(&self, metadata: &Metadata) -> Option<String> {
        use std::os::unix::fs::MetadataExt;

        let uid = metadata.uid();
        let name = self
            .users
            .list()
            .iter()
            .find(|user| **user.id() == uid)
            .map(|user| user.name().to_string());
        Some(name.unwrap_or_else(|| uid.to_string()))
    }

    #[cfg(not(unix))]
    pub fn owner_of(&self, _metadata: &Metadata) -> Option<String> {
        None
    }
}
