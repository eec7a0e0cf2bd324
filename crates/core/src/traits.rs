//! Capability bits advertised by value variants.
//!
//! Operators are dispatched by consulting these bits rather than by ad-hoc
//! type switches; a missing bit yields a uniform `no_such_overload` error.

use bitflags::bitflags;

bitflags! {
    /// The operations a value variant supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Traits: u32 {
        const ADDER        = 1 << 0;
        const SUBTRACTOR   = 1 << 1;
        const MULTIPLIER   = 1 << 2;
        const DIVIDER      = 1 << 3;
        const MODDER       = 1 << 4;
        const NEGATER      = 1 << 5;
        const COMPARER     = 1 << 6;
        /// Membership test (`in`).
        const CONTAINER    = 1 << 7;
        const INDEXER      = 1 << 8;
        const ITERABLE     = 1 << 9;
        const SIZER        = 1 << 10;
        /// Regex matching.
        const MATCHER      = 1 << 11;
        /// Zero/one-argument method dispatch.
        const RECEIVER     = 1 << 12;
        /// Field presence testing (`has`).
        const FIELD_TESTER = 1 << 13;
    }
}
