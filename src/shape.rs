//! Compile-time classification of serializable types.
//!
//! The codec picks its strategy per type: containers carry an element count,
//! tuploids (fixed arity, positionally accessed) are written field by field
//! with no prefix. The three questions are answered by [Shape] constants so
//! they can be asked in `const` context.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

pub trait Shape {
    /// Dynamically sized, homogeneous and iterable.
    const IS_CONTAINER: bool = false;
    /// Fixed arity, accessed by position.
    const IS_TUPLOID: bool = false;
    /// Elements laid out next to each other and indexable.
    const IS_CONTIGUOUS: bool = false;
}

pub const fn is_container<T: Shape + ?Sized>() -> bool {
    T::IS_CONTAINER
}

pub const fn is_tuploid<T: Shape + ?Sized>() -> bool {
    T::IS_TUPLOID
}

pub const fn is_contiguous<T: Shape + ?Sized>() -> bool {
    T::IS_CONTIGUOUS
}

macro_rules! plain {
    ($($ty:ty),+) => {
        $(impl Shape for $ty {})+
    };
}

plain!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64, bool, char, String, str);

impl<T: Shape + ?Sized> Shape for &T {
    const IS_CONTAINER: bool = T::IS_CONTAINER;
    const IS_TUPLOID: bool = T::IS_TUPLOID;
    const IS_CONTIGUOUS: bool = T::IS_CONTIGUOUS;
}

impl<T: Shape + ?Sized> Shape for Box<T> {
    const IS_CONTAINER: bool = T::IS_CONTAINER;
    const IS_TUPLOID: bool = T::IS_TUPLOID;
    const IS_CONTIGUOUS: bool = T::IS_CONTIGUOUS;
}

// Arrays are both: fixed arity, and a run of equal elements.
impl<T, const N: usize> Shape for [T; N] {
    const IS_CONTAINER: bool = true;
    const IS_TUPLOID: bool = true;
    const IS_CONTIGUOUS: bool = true;
}

impl<T> Shape for [T] {
    const IS_CONTAINER: bool = true;
    const IS_CONTIGUOUS: bool = true;
}

impl<T> Shape for Vec<T> {
    const IS_CONTAINER: bool = true;
    const IS_CONTIGUOUS: bool = true;
}

impl<T> Shape for VecDeque<T> {
    const IS_CONTAINER: bool = true;
}

impl<T> Shape for BTreeSet<T> {
    const IS_CONTAINER: bool = true;
}

impl<K, V> Shape for BTreeMap<K, V> {
    const IS_CONTAINER: bool = true;
}

impl<T, S> Shape for HashSet<T, S> {
    const IS_CONTAINER: bool = true;
}

impl<K, V, S> Shape for HashMap<K, V, S> {
    const IS_CONTAINER: bool = true;
}

macro_rules! tuploid {
    ($($T:ident),+) => {
        impl<$($T),+> Shape for ($($T,)+) {
            const IS_TUPLOID: bool = true;
        }
    };
}

tuploid!(A);
tuploid!(A, B);
tuploid!(A, B, C);
tuploid!(A, B, C, D);
tuploid!(A, B, C, D, F);
tuploid!(A, B, C, D, F, G);
tuploid!(A, B, C, D, F, G, H);
tuploid!(A, B, C, D, F, G, H, J);

#[cfg(test)]
mod tests {
    use super::*;

    const _: () = {
        assert!(is_container::<Vec<i32>>());
        assert!(is_container::<BTreeSet<i32>>());
        assert!(is_container::<BTreeMap<i32, i32>>());
        assert!(is_container::<[i32; 5]>());
        assert!(!is_container::<(i32, i32, i32)>());
        assert!(!is_container::<(i32, (i32, i32))>());
        assert!(!is_container::<i32>());

        assert!(!is_tuploid::<Vec<i32>>());
        assert!(!is_tuploid::<BTreeSet<i32>>());
        assert!(!is_tuploid::<BTreeMap<i32, i32>>());
        assert!(is_tuploid::<[i32; 5]>());
        assert!(is_tuploid::<(i32, i32, i32)>());
        assert!(is_tuploid::<(i32, (i32, i32))>());
        assert!(!is_tuploid::<i32>());

        assert!(is_contiguous::<Vec<i32>>());
        assert!(!is_contiguous::<BTreeSet<i32>>());
        assert!(!is_contiguous::<BTreeMap<i32, i32>>());
        assert!(is_contiguous::<[i32; 5]>());
        assert!(!is_contiguous::<(i32, i32, i32)>());
        assert!(!is_contiguous::<i32>());
    };

    #[test]
    fn test_nested_shapes() {
        assert!(is_container::<Vec<Vec<i32>>>());
        assert!(is_container::<BTreeMap<(i32, String), Vec<u8>>>());
        assert!(is_tuploid::<Box<(u8, u8)>>());
        assert!(is_container::<&[u8]>());
        assert!(!is_container::<String>());
    }
}
