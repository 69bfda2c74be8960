/// Circuit breaker for the task loop. Every model round-trip counts,
/// whether it produced an action or a wait.
#[derive(Debug)]
pub struct LoopController {
    max_iterations: u32,
    iterations: u32,
}

impl LoopController {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            iterations: 0,
        }
    }

    /// Claim the next iteration. Returns false once the cap is spent.
    pub fn next_iteration(&mut self) -> bool {
        if self.iterations >= self.max_iterations {
            return false;
        }
        self.iterations += 1;
        true
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}
