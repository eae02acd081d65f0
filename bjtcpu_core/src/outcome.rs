pub mod outcome {
    /// What one `Cpu::step` call did.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum StepOutcome {
        /// One instruction byte was staged.
        Fetched,
        /// A micro-step ran; the instruction needs more steps.
        Pending,
        /// The instruction finished and staging was cleared.
        Completed,
        /// STOP executed, now or earlier.
        Halted,
    }
}
