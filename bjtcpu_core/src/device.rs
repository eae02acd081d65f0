pub mod device {
    /// Receiver for byte-wide signals the CPU emits when a program writes
    /// the display register. The sink owns whatever state the signals
    /// build up; the CPU never reads it back.
    pub trait SignalSink {
        fn receive(&mut self, value: u8);
    }

    /// Sink for runs with no peripheral attached.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct NullSink;

    impl SignalSink for NullSink {
        fn receive(&mut self, _value: u8) {}
    }

    /// Records every signal in order.
    #[derive(Debug, Default, Clone)]
    pub struct CaptureSink {
        pub signals: Vec<u8>,
    }

    impl SignalSink for CaptureSink {
        fn receive(&mut self, value: u8) {
            self.signals.push(value);
        }
    }
}
