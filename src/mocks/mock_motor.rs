// This file is only compiled during tests

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::ActuatorError;
use crate::thruster::MotorOutput;

thread_local! {
    static MOCK_DUTY_HISTORY: RefCell<HashMap<u8, Vec<u16>>> = RefCell::new(HashMap::new());
    static MOCK_DISABLED: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

pub struct MockMotor {
    channel: u8,
}

impl MockMotor {
    pub fn new(channel: u8) -> Box<Self> {
        Box::new(Self { channel })
    }
}

impl MotorOutput for MockMotor {
    fn set_duty(&mut self, duty: u16) -> Result<(), ActuatorError> {
        MOCK_DUTY_HISTORY.with(|history| {
            history
                .borrow_mut()
                .entry(self.channel)
                .or_default()
                .push(duty);
        });
        Ok(())
    }

    fn disable(&mut self) -> Result<(), ActuatorError> {
        MOCK_DISABLED.with(|disabled| disabled.borrow_mut().push(self.channel));
        Ok(())
    }
}

// test helper: last duty written to a channel
pub fn get_mock_duty(channel: u8) -> Option<u16> {
    MOCK_DUTY_HISTORY.with(|history| {
        history
            .borrow()
            .get(&channel)
            .and_then(|duties| duties.last().copied())
    })
}

// test helper: every duty written to a channel, oldest first
pub fn get_mock_duty_history(channel: u8) -> Vec<u16> {
    MOCK_DUTY_HISTORY.with(|history| history.borrow().get(&channel).cloned().unwrap_or_default())
}

pub fn is_mock_disabled(channel: u8) -> bool {
    MOCK_DISABLED.with(|disabled| disabled.borrow().contains(&channel))
}

// test helper to reset all channels
pub fn reset_mock_motors() {
    MOCK_DUTY_HISTORY.with(|history| history.borrow_mut().clear());
    MOCK_DISABLED.with(|disabled| disabled.borrow_mut().clear());
}
