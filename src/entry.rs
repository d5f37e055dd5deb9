//! The contract a record type fulfils to be stored in a [crate::Table].
//!
//! An entry exposes a fixed number of fields. Each field is reachable by its
//! position through [Field], is totally ordered, and gets its own ordered
//! index inside the table. The set of indices is spelled out by
//! [Entry::Indices], a tuple `(IndexSet<Self, 0>, .., IndexSet<Self, N - 1>)`,
//! so the arity is known at compile time.
//!
//! Tuples up to six elements are entries out of the box. Named structs use
//! [crate::impl_entry].

use crate::index::{IndexGroup, IndexSet};

/// Per-field rule governing duplicate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Uniqueness {
    /// Several records may share the value.
    #[default]
    NotUnique,
    /// Inserts and updates that would duplicate the value are refused.
    EnforceUnique,
    /// The caller promises the value never repeats and the check is skipped.
    /// Breaking the promise keeps every record, but which of the duplicates a
    /// lookup returns is unspecified.
    AssumeUnique,
}

/// A record type storable in a [crate::Table].
pub trait Entry: Sized {
    /// One ordered index per field, in field order.
    type Indices: IndexGroup<Self>;

    /// Field whose index drives unqualified iteration.
    ///
    /// `None` keeps the implicit identity order of the record arena.
    const DEFAULT_LOOKUP: Option<usize> = None;

    /// Number of fields.
    const FIELDS: usize = <Self::Indices as IndexGroup<Self>>::ARITY;
}

/// Positional access to field `I` of an entry.
pub trait Field<const I: usize>: Entry {
    type Value: Ord + Clone;

    const UNIQUENESS: Uniqueness = Uniqueness::NotUnique;

    fn field(&self) -> &Self::Value;

    fn field_mut(&mut self) -> &mut Self::Value;

    /// The index of this field inside the table's index tuple.
    fn index(indices: &Self::Indices) -> &IndexSet<Self, I>;

    fn index_mut(indices: &mut Self::Indices) -> &mut IndexSet<Self, I>;
}

macro_rules! tuple_entries {
    ($(($idx:tt, $T:ident)),+ $(,)?) => {
        tuple_entries!(@entry [$($T),+] [$($idx),+]);
        tuple_entries!(@fields [$($T),+] $(($idx, $T))+);
    };
    (@entry [$($T:ident),+] [$($idx:tt),+]) => {
        impl<$($T: Ord + Clone),+> Entry for ($($T,)+) {
            type Indices = ($(IndexSet<Self, $idx>,)+);
        }
    };
    (@fields $all:tt $(($idx:tt, $T:ident))+) => {
        $(tuple_entries!(@field $all $idx $T);)+
    };
    (@field [$($All:ident),+] $idx:tt $T:ident) => {
        impl<$($All: Ord + Clone),+> Field<$idx> for ($($All,)+) {
            type Value = $T;

            fn field(&self) -> &$T {
                &self.$idx
            }

            fn field_mut(&mut self) -> &mut $T {
                &mut self.$idx
            }

            fn index(indices: &Self::Indices) -> &IndexSet<Self, $idx> {
                &indices.$idx
            }

            fn index_mut(indices: &mut Self::Indices) -> &mut IndexSet<Self, $idx> {
                &mut indices.$idx
            }
        }
    };
}

tuple_entries!((0, A));
tuple_entries!((0, A), (1, B));
tuple_entries!((0, A), (1, B), (2, C));
tuple_entries!((0, A), (1, B), (2, C), (3, D));
tuple_entries!((0, A), (1, B), (2, C), (3, D), (4, F));
tuple_entries!((0, A), (1, B), (2, C), (3, D), (4, F), (5, G));

/// Declares a struct with named fields as an [Entry].
///
/// Fields are listed with their position and type. A uniqueness policy may
/// follow in brackets, and a trailing `default = N;` picks the field whose
/// index drives unqualified iteration.
///
/// # Example
/// ```
/// use multitable::{Table, impl_entry};
///
/// struct User {
///     id: u32,
///     name: String,
/// }
///
/// impl_entry! {
///     User {
///         0 => id: u32 [EnforceUnique],
///         1 => name: String,
///     }
///     default = 0;
/// }
///
/// let mut table = Table::new();
/// assert!(table.insert(User { id: 1, name: "Alice".into() }).is_some());
/// assert!(table.insert(User { id: 1, name: "Bob".into() }).is_none());
/// ```
#[macro_export]
macro_rules! impl_entry {
    (
        $ty:ty {
            $($idx:tt => $field:ident : $fty:ty $([$policy:ident])?),+ $(,)?
        }
        $(default = $default:expr;)?
    ) => {
        impl $crate::Entry for $ty {
            type Indices = ($($crate::IndexSet<Self, $idx>,)+);

            const DEFAULT_LOOKUP: ::core::option::Option<usize> =
                $crate::impl_entry!(@default $($default)?);
        }

        $(
            impl $crate::Field<$idx> for $ty {
                type Value = $fty;

                const UNIQUENESS: $crate::Uniqueness = $crate::impl_entry!(@policy $($policy)?);

                fn field(&self) -> &$fty {
                    &self.$field
                }

                fn field_mut(&mut self) -> &mut $fty {
                    &mut self.$field
                }

                fn index(
                    indices: &<Self as $crate::Entry>::Indices,
                ) -> &$crate::IndexSet<Self, $idx> {
                    &indices.$idx
                }

                fn index_mut(
                    indices: &mut <Self as $crate::Entry>::Indices,
                ) -> &mut $crate::IndexSet<Self, $idx> {
                    &mut indices.$idx
                }
            }
        )+
    };
    (@default) => {
        ::core::option::Option::None
    };
    (@default $default:expr) => {
        ::core::option::Option::Some($default)
    };
    (@policy) => {
        $crate::Uniqueness::NotUnique
    };
    (@policy $policy:ident) => {
        $crate::Uniqueness::$policy
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Account {
        number: u64,
        owner: String,
    }

    crate::impl_entry! {
        Account {
            0 => number: u64 [EnforceUnique],
            1 => owner: String,
        }
        default = 1;
    }

    #[test]
    fn test_tuple_fields() {
        let mut entry = (1i32, "one".to_string(), 'x');

        assert_eq!(<(i32, String, char) as Entry>::FIELDS, 3);
        assert_eq!(*Field::<0>::field(&entry), 1);
        assert_eq!(Field::<1>::field(&entry), "one");

        *Field::<2>::field_mut(&mut entry) = 'y';
        assert_eq!(entry.2, 'y');

        assert_eq!(<(i32, String, char) as Entry>::DEFAULT_LOOKUP, None);
        assert_eq!(
            <(i32, String, char) as Field<0>>::UNIQUENESS,
            Uniqueness::NotUnique
        );
    }

    #[test]
    fn test_declared_entry() {
        let mut account = Account {
            number: 7,
            owner: "Alice".into(),
        };

        assert_eq!(Account::FIELDS, 2);
        assert_eq!(Account::DEFAULT_LOOKUP, Some(1));
        assert_eq!(
            <Account as Field<0>>::UNIQUENESS,
            Uniqueness::EnforceUnique
        );
        assert_eq!(<Account as Field<1>>::UNIQUENESS, Uniqueness::NotUnique);

        *Field::<1>::field_mut(&mut account) = "Bob".into();
        assert_eq!(account.owner, "Bob");
        assert_eq!(*Field::<0>::field(&account), 7);
    }
}
