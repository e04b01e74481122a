//! Landlock access-right masks.
//!
//! Bit values mirror the kernel UAPI (`linux/landlock.h`) and the `landlock`
//! crate's flags, so the kernel provider converts masks by their raw bits.

use bitflags::bitflags;

bitflags! {
    /// Filesystem rights handled by a ruleset or granted by a path rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFs: u64 {
        /// Execute a file.
        const EXECUTE = 1 << 0;
        /// Open a file with write access.
        const WRITE_FILE = 1 << 1;
        /// Open a file with read access.
        const READ_FILE = 1 << 2;
        /// Open a directory or list its content.
        const READ_DIR = 1 << 3;
        /// Remove an empty directory or rename one.
        const REMOVE_DIR = 1 << 4;
        /// Unlink or rename a file.
        const REMOVE_FILE = 1 << 5;
        /// Create, rename or link a character device.
        const MAKE_CHAR = 1 << 6;
        /// Create or rename a directory.
        const MAKE_DIR = 1 << 7;
        /// Create, rename or link a regular file.
        const MAKE_REG = 1 << 8;
        /// Create, rename or link a UNIX domain socket.
        const MAKE_SOCK = 1 << 9;
        /// Create, rename or link a named pipe.
        const MAKE_FIFO = 1 << 10;
        /// Create, rename or link a block device.
        const MAKE_BLOCK = 1 << 11;
        /// Create, rename or link a symbolic link.
        const MAKE_SYM = 1 << 12;
        /// Link or rename a file from or to a different directory.
        const REFER = 1 << 13;
        /// Truncate a file.
        const TRUNCATE = 1 << 14;
    }
}

bitflags! {
    /// Network rights handled by a ruleset or granted by a port rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessNet: u64 {
        /// Bind a TCP socket to a local port.
        const BIND_TCP = 1 << 0;
        /// Connect a TCP socket to a remote port.
        const CONNECT_TCP = 1 << 1;
    }
}

impl AccessFs {
    /// Rights that remain meaningful when the rule target is not a directory.
    pub const FILE_ONLY: Self = Self::EXECUTE
        .union(Self::WRITE_FILE)
        .union(Self::READ_FILE)
        .union(Self::TRUNCATE);

    /// Rights granted to read-only paths.
    pub const ROUGHLY_READ: Self = Self::EXECUTE
        .union(Self::READ_FILE)
        .union(Self::READ_DIR);

    /// Rights added on top of [`AccessFs::ROUGHLY_READ`] for read-write paths.
    pub const ROUGHLY_WRITE: Self = Self::WRITE_FILE
        .union(Self::REMOVE_DIR)
        .union(Self::REMOVE_FILE)
        .union(Self::MAKE_CHAR)
        .union(Self::MAKE_DIR)
        .union(Self::MAKE_REG)
        .union(Self::MAKE_SOCK)
        .union(Self::MAKE_FIFO)
        .union(Self::MAKE_BLOCK)
        .union(Self::MAKE_SYM)
        .union(Self::REFER)
        .union(Self::TRUNCATE);

    /// Restricts the mask to what a rule on the given target type can carry.
    ///
    /// ```
    /// use sandbox_launcher::AccessFs;
    ///
    /// let rw = AccessFs::ROUGHLY_READ | AccessFs::ROUGHLY_WRITE;
    /// assert_eq!(rw.for_target(true), rw);
    /// assert_eq!(rw.for_target(false), AccessFs::FILE_ONLY);
    /// ```
    #[must_use]
    pub const fn for_target(self, is_directory: bool) -> Self {
        if is_directory {
            self
        } else {
            self.intersection(Self::FILE_ONLY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_write_groups_cover_every_right() {
        assert_eq!(AccessFs::ROUGHLY_READ | AccessFs::ROUGHLY_WRITE, AccessFs::all());
    }

    #[test]
    fn file_targets_drop_directory_rights() {
        let restricted = AccessFs::all().for_target(false);
        assert!(!restricted.intersects(
            AccessFs::READ_DIR | AccessFs::MAKE_DIR | AccessFs::REMOVE_FILE | AccessFs::REFER
        ));
        assert_eq!(restricted, AccessFs::FILE_ONLY);
    }

    #[test]
    fn read_only_file_keeps_execute_and_read() {
        assert_eq!(
            AccessFs::ROUGHLY_READ.for_target(false),
            AccessFs::EXECUTE | AccessFs::READ_FILE
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn groupings_match_the_landlock_crate() {
        use landlock::{ABI, Access};

        assert_eq!(
            AccessFs::all().bits(),
            landlock::AccessFs::from_all(ABI::V4).bits()
        );
        assert_eq!(
            AccessFs::ROUGHLY_READ.bits(),
            landlock::AccessFs::from_read(ABI::V1).bits()
        );
        assert_eq!(
            AccessFs::FILE_ONLY.bits(),
            landlock::AccessFs::from_file(ABI::V4).bits()
        );
        assert_eq!(
            AccessNet::all().bits(),
            landlock::AccessNet::from_all(ABI::V4).bits()
        );
    }
}
