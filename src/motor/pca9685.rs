// PCA9685 PWM expander backend (Linux I2C)
//
// Outputs 0-3 feed the H-bridge inputs: left-fwd, left-rev, right-fwd, right-rev.

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use tracing::{debug, info};

use super::driver::{output_index, ActuationError, Line, LineDriver, MotorChannel, Result};
use crate::config::MAX_POWER;

const MODE_1_REG: u8 = 0x00;
const MODE_2_REG: u8 = 0x01;
const LED0_ON_L: u8 = 0x06;
const PRE_SCALE_REG: u8 = 0xFE;

const MODE1_SLEEP: u8 = 0x10;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_RESTART: u8 = 0x80;
const MODE2_TOTEM_POLE: u8 = 0x04;

/// Internal oscillator frequency
const OSC_HZ: f32 = 25_000_000.0;

/// 12-bit duty resolution
const DUTY_MAX: u16 = 4095;

pub struct Pca9685Lines {
    device: LinuxI2CDevice,
}

impl Pca9685Lines {
    /// Open the expander on `bus` at `address` and set the PWM frequency
    pub fn open(bus: &Path, address: u16, frequency: u16) -> Result<Self> {
        if !(24..=1526).contains(&frequency) {
            return Err(ActuationError::Init(format!(
                "PWM frequency {} Hz outside 24-1526 Hz",
                frequency
            )));
        }

        info!("Opening PCA9685 at 0x{:02X} on {}", address, bus.display());
        let device = LinuxI2CDevice::new(bus, address).map_err(init_error)?;
        let mut pca = Self { device };

        pca.write(MODE_2_REG, MODE2_TOTEM_POLE)?;
        pca.write(MODE_1_REG, MODE1_AUTO_INCREMENT)?;
        sleep(Duration::from_millis(6));

        // Prescaler can only be written while the oscillator sleeps
        let prescale = (OSC_HZ / (4096.0 * frequency as f32) - 1.0).round() as u8;
        pca.write(MODE_1_REG, MODE1_AUTO_INCREMENT | MODE1_SLEEP)?;
        pca.write(PRE_SCALE_REG, prescale)?;
        pca.write(MODE_1_REG, MODE1_AUTO_INCREMENT)?;
        sleep(Duration::from_millis(6));
        pca.write(MODE_1_REG, MODE1_AUTO_INCREMENT | MODE1_RESTART)?;

        debug!("PCA9685 prescale={} for {} Hz", prescale, frequency);
        Ok(pca)
    }

    fn write(&mut self, register: u8, value: u8) -> Result<()> {
        self.device
            .smbus_write_byte_data(register, value)
            .map_err(init_error)
    }
}

fn init_error(e: LinuxI2CError) -> ActuationError {
    ActuationError::Init(e.to_string())
}

/// Scale an 8-bit drive power to the expander's 12-bit duty
fn duty_for(power: u8) -> u16 {
    (power as u32 * DUTY_MAX as u32 / MAX_POWER as u32) as u16
}

impl LineDriver for Pca9685Lines {
    fn set_line(&mut self, channel: MotorChannel, line: Line, power: u8) -> Result<()> {
        let duty = duty_for(power);
        let base = LED0_ON_L + 4 * output_index(channel, line) as u8;
        let regs = [0u8, 0, (duty & 0xFF) as u8, (duty >> 8) as u8];

        for (offset, value) in regs.into_iter().enumerate() {
            self.device
                .smbus_write_byte_data(base + offset as u8, value)
                .map_err(|e| ActuationError::Bus {
                    channel,
                    line,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pca9685"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_scaling() {
        assert_eq!(duty_for(0), 0);
        assert_eq!(duty_for(MAX_POWER), DUTY_MAX);
        assert_eq!(duty_for(128), 2055);
    }
}
