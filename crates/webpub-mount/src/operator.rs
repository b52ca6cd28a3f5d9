//! Interaction with the human running a recovery.

/// Answers the questions a clean asks before it changes anything.
pub trait Operator {
    /// Pick one of `options` by name. `None` (or a name not in `options`) aborts.
    fn choose(&mut self, prompt: &str, options: &[String]) -> Option<String>;

    /// Yes/no confirmation; anything but an explicit yes is a no.
    fn confirm(&mut self, question: &str) -> bool;
}
