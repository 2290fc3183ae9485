//! Byte-order types shared by the schema model and the executor.

/// Byte order of a field or struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Short label used in layout tables and error messages.
    pub fn label(self) -> &'static str {
        match self {
            Endianness::Little => "le",
            Endianness::Big => "be",
        }
    }
}

impl std::fmt::Display for Endianness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-field byte-order state.
///
/// A field either carries an explicit override (set with
/// [`Field::endian`](crate::schema::Field::endian), or force-applied when an
/// embedding field overrides its whole subtree) or inherits the default of
/// the struct it was last attached to. Inherited state is re-resolved on
/// every attachment; explicit state survives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldEndian {
    endian: Endianness,
    explicit: bool,
}

impl FieldEndian {
    /// State for a freshly built field: inherits whatever struct it joins.
    pub(crate) fn inherited() -> Self {
        FieldEndian {
            endian: Endianness::Little,
            explicit: false,
        }
    }

    /// Explicit override, immune to later default propagation.
    pub(crate) fn explicit(endian: Endianness) -> Self {
        FieldEndian {
            endian,
            explicit: true,
        }
    }

    /// Applies a struct default. A forced application (an embedding field
    /// carrying its own override) rewrites the state and marks it explicit;
    /// a plain application only fills in inherited state.
    pub(crate) fn apply(&mut self, default: Endianness, force: bool) {
        if force {
            *self = FieldEndian::explicit(default);
        } else if !self.explicit {
            self.endian = default;
        }
    }

    /// The byte order this field resolves to under the given role.
    ///
    /// Explicit overrides are fixed at build time; inherited state follows
    /// the role, so the role matching the struct's declared default
    /// reproduces the attach-time resolution.
    pub fn effective(self, role: Endianness) -> Endianness {
        if self.explicit {
            self.endian
        } else {
            role
        }
    }

    /// The byte order resolved at attach time (the declared-default role).
    pub fn resolved(self) -> Endianness {
        self.endian
    }

    /// Whether this field carries an explicit override.
    pub fn is_explicit(self) -> bool {
        self.explicit
    }
}
