/// One step of an ordered fallback chain.
pub trait Strategy<I: ?Sized, O> {
    fn name(&self) -> &str;
    fn attempt(&self, input: &I) -> Option<O>;
}

/// Try each strategy in order; the first one that produces a value wins.
pub fn first_success<'s, I: ?Sized, O>(
    chain: &[&'s dyn Strategy<I, O>],
    input: &I,
) -> Option<(O, &'s str)> {
    chain
        .iter()
        .find_map(|s| s.attempt(input).map(|out| (out, s.name())))
}
