//! Grammar-aware rendering.

use crate::grammar::Grammar;
use std::fmt;

/// Types that render against the grammar owning their ids.
///
/// Productions, items, conflicts and whole tables only carry dense ids;
/// turning those back into names needs the grammar, so their display
/// adapters borrow both.
pub trait DisplayWith {
    fn fmt_with(&self, g: &Grammar, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    /// Pair `self` with the grammar, yielding a value usable with `{}`.
    fn display<'g>(&'g self, g: &'g Grammar) -> WithGrammar<'g, Self> {
        WithGrammar {
            value: self,
            grammar: g,
        }
    }
}

/// A value bundled with the grammar it renders against.
pub struct WithGrammar<'g, T: ?Sized> {
    value: &'g T,
    grammar: &'g Grammar,
}

impl<T> fmt::Display for WithGrammar<'_, T>
where
    T: DisplayWith + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt_with(self.grammar, f)
    }
}
