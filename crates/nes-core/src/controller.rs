//! Standard controller ports at $4016/$4017

/// Button bit positions in a controller mask, in serial read-out order.
pub mod button {
    pub const A: u8 = 1 << 0;
    pub const B: u8 = 1 << 1;
    pub const SELECT: u8 = 1 << 2;
    pub const START: u8 = 1 << 3;
    pub const UP: u8 = 1 << 4;
    pub const DOWN: u8 = 1 << 5;
    pub const LEFT: u8 = 1 << 6;
    pub const RIGHT: u8 = 1 << 7;
}

/// Standard NES pad: a parallel-in, serial-out shift register.
#[derive(Debug, Clone, Default)]
pub struct StandardController {
    /// Buttons currently held, as fed by the frontend
    buttons: u8,
    /// Latched copy being shifted out
    shift: u8,
    /// Number of bits already shifted out since the last latch
    reads: u8,
    strobe: bool,
}

impl StandardController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held-button mask (see [`button`]).
    pub fn set_buttons(&mut self, mask: u8) {
        self.buttons = mask;
        if self.strobe {
            self.latch();
        }
    }

    pub fn buttons(&self) -> u8 {
        self.buttons
    }

    /// $4016 write, bit 0.
    pub fn strobe_write(&mut self, value: u8) {
        self.strobe = value & 0x01 != 0;
        if self.strobe {
            self.latch();
        }
    }

    /// Next serial bit. While strobe is high this keeps returning A.
    /// After eight reads an official pad returns 1.
    pub fn read(&mut self) -> u8 {
        if self.strobe {
            return self.buttons & 0x01;
        }
        if self.reads >= 8 {
            return 1;
        }
        let bit = self.shift & 0x01;
        self.shift >>= 1;
        self.reads += 1;
        bit
    }

    /// Bit 0 of the next read without shifting.
    pub fn peek(&self) -> u8 {
        if self.strobe {
            self.buttons & 0x01
        } else if self.reads >= 8 {
            1
        } else {
            self.shift & 0x01
        }
    }

    fn latch(&mut self) {
        self.shift = self.buttons;
        self.reads = 0;
    }
}
