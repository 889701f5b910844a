#![cfg_attr(not(test), no_std)]
//! SHTC3 driver.
//!
//! Example:
//!
//!     # use embedded_hal_mock::eh1::delay::NoopDelay as MockDelay;
//!     # use embedded_hal_mock::eh1::i2c::Mock as I2cMock;
//!     # use embedded_hal_mock::eh1::i2c::Transaction;
//!     # use shtc3_driver::{PowerMode, Shtc3, TimingMode, SENSOR_ADDRESS};
//!     # let expectations = vec![
//!     #     // Measure, normal power, clock stretching enabled.
//!     #     Transaction::write(SENSOR_ADDRESS, vec![0x7C, 0xA2]),
//!     #     // 6 byte reply: temperature (2 bytes + CRC), humidity (2 bytes + CRC).
//!     #     // 0x6666 is about 25C, 0x8000 is exactly 50% relative humidity.
//!     #     Transaction::read(
//!     #         SENSOR_ADDRESS,
//!     #         vec![0x66, 0x66, 0x93, 0x80, 0x00, 0xA2],
//!     #     ),
//!     # ];
//!     # let mock_i2c = I2cMock::new(&expectations);
//!     # let mock_delay = MockDelay::new();
//!     let mut shtc3 = Shtc3::new(mock_i2c, mock_delay, SENSOR_ADDRESS);
//!     let measurement = shtc3.measure(TimingMode::Stretched, PowerMode::Normal).unwrap();
//!
//!     println!("temperature (shtc3): {:.2}C", measurement.temperature);
//!     println!("humidity (shtc3): {:.2}%", measurement.humidity);
//!     # let (mut mock, _delay) = shtc3.destroy();
//!     # mock.done();
//!
//! [SHTC3 Datasheet](https://sensirion.com/media/documents/643F9C8E/63A5A436/Datasheet_SHTC3.pdf)
//!
//! The SHTC3 is a low-power humidity and temperature sensor on a fixed I2C
//! address (0x70). A measurement is a single command-and-reply exchange, but
//! the sensor offers two ways of waiting for the conversion and two power
//! levels, giving four measurement commands in total (datasheet section 5.6,
//! Table 9):
//!
//! * **Clock stretching** ([`TimingMode::Stretched`]): the sensor holds SCL low
//!   until the result is ready, so a single blocking 6-byte read suffices.
//! * **Polling** ([`TimingMode::Polled`]): the sensor NACKs read headers while
//!   it is still converting. The driver probes with short reads, waiting 1 ms
//!   between attempts, before fetching the 6-byte result.
//!
//! ```text
//!       measure(timing, power)
//!                │
//!                ▼
//!      select command (Table 9)
//!                │
//!                ▼
//!        write 2 command bytes
//!                │
//!        ┌───────┴────────┐
//!   Stretched          Polled
//!        │                │
//!        │          probe 1 byte ◄──┐
//!        │                │         │
//!        │              NACK ─► wait 1 ms (up to 20 times)
//!        │                │
//!        └───────┬────────┘
//!                ▼
//!          read 6 bytes
//!                │
//!                ▼
//!      CRC check temperature ─► bad ─► Error::InvalidCrc
//!                │
//!                ▼
//!       CRC check humidity ─► bad ─► Error::InvalidCrc
//!                │
//!                ▼
//!      convert to °C and %RH
//! ```
//!
//! Each 16-bit value on the wire is big-endian and is followed by an 8-bit
//! CRC over those two bytes (datasheet section 5.10). A measurement is only
//! ever returned after both CRCs check out - there is no partial result.

use crc_any::CRCu8;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

/// SHTC3 sensor's I2C address.
///
/// The SHTC3 has a single, fixed address (datasheet section 5.3).
pub const SENSOR_ADDRESS: u8 = 0x70;

/// How many single-byte probe reads the polled measurement path attempts
/// before giving up on probing and issuing the final data read anyway.
const MAX_PROBE_ATTEMPTS: u8 = 20;

/// Non-measurement commands accepted by the SHTC3.
///
/// Every SHTC3 command is 16 bits, sent most significant byte first. The
/// measurement commands are not listed here - they are selected from the
/// ([`TimingMode`], [`PowerMode`]) pair by [`measure_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Command {
    /// Read the ID register (datasheet section 5.9). The reply is 2 ID bytes
    /// plus a CRC byte; [`Shtc3::is_present`] uses it as a presence and bus
    /// integrity check.
    GetId,
    /// Enter sleep mode (datasheet section 5.2). The sensor only draws its
    /// lowest current while asleep, but ignores measurement commands.
    Sleep,
    /// Wake the sensor up out of sleep mode.
    WakeUp,
}

impl Command {
    /// The 2-byte wire encoding of this command.
    pub fn bytes(self) -> [u8; 2] {
        match self {
            Command::GetId => [0xEF, 0xC8],
            Command::Sleep => [0xB0, 0x98],
            Command::WakeUp => [0x35, 0x17],
        }
    }
}

/// How the driver waits for a measurement to complete.
///
/// See the module documentation for the difference between the two modes.
/// Clock stretching is simpler but ties up the bus for the whole conversion;
/// polling keeps the bus free between probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum TimingMode {
    /// The sensor stretches the clock until the result is ready.
    Stretched,
    /// The sensor NACKs reads until the result is ready and must be probed.
    Polled,
}

/// Power/precision trade-off for a single measurement.
///
/// Low power mode shortens the conversion (roughly 0.8 ms against 12 ms in
/// normal mode, datasheet Table 4) at the cost of repeatability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum PowerMode {
    /// Full precision measurement.
    Normal,
    /// Faster, lower-power, noisier measurement.
    Low,
}

/// Select the 2-byte measurement command for a mode combination.
///
/// These are the "read temperature first" variants from Table 9 of the
/// datasheet: the reply carries temperature in bytes 0-1 and humidity in
/// bytes 3-4. The match is exhaustive over both closed enums, so there is no
/// invalid combination left to reject at runtime.
pub fn measure_command(timing: TimingMode, power: PowerMode) -> [u8; 2] {
    match (timing, power) {
        (TimingMode::Stretched, PowerMode::Normal) => [0x7C, 0xA2],
        (TimingMode::Stretched, PowerMode::Low) => [0x64, 0x58],
        (TimingMode::Polled, PowerMode::Normal) => [0x78, 0x66],
        (TimingMode::Polled, PowerMode::Low) => [0x60, 0x9C],
    }
}

/// The raw 6-byte measurement reply, split into its fields.
///
/// Wire order is temperature high byte, temperature low byte, temperature
/// CRC, humidity high byte, humidity low byte, humidity CRC. This only lives
/// for the duration of one `measure` call; it is either validated and
/// converted into a [`Measurement`] or discarded.
struct RawMeasurement {
    temperature: [u8; 2],
    temperature_crc: u8,
    humidity: [u8; 2],
    humidity_crc: u8,
}

impl RawMeasurement {
    fn from_bytes(data: [u8; 6]) -> Self {
        RawMeasurement {
            temperature: [data[0], data[1]],
            temperature_crc: data[2],
            humidity: [data[3], data[4]],
            humidity_crc: data[5],
        }
    }
}

/// A single CRC-validated reading from the SHTC3 sensor.
///
/// This is returned from the `measure` method. You get:
/// * temperature in degrees Celsius
/// * humidity in % Relative Humidity
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct Measurement {
    pub temperature: f32,
    pub humidity: f32,
}

impl Measurement {
    /// Convert a validated raw reply into physical units.
    ///
    /// Both raw values are unsigned 16-bit, big-endian. The formulas are from
    /// datasheet section 5.11: the full 16-bit range maps linearly onto
    /// -45..130 °C and 0..100 %RH.
    fn from_raw(raw: &RawMeasurement) -> Self {
        let raw_temperature = u16::from_be_bytes(raw.temperature);
        let raw_humidity = u16::from_be_bytes(raw.humidity);

        Measurement {
            temperature: -45.0 + 175.0 * (raw_temperature as f32 / 65536.0),
            humidity: 100.0 * (raw_humidity as f32 / 65536.0),
        }
    }
}

/// Driver errors.
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// I2C bus error
    I2c(E),
    /// CRC validation failed
    InvalidCrc,
}

/// An SHTC3 sensor on the I2C bus `I`, with delays provided by `D`.
///
/// The address of the sensor will be `SENSOR_ADDRESS` from this package,
/// unless there is some kind of special address translating hardware in use.
/// The delay provider is only exercised by polled measurements; every other
/// operation is a plain write or write-then-read exchange.
pub struct Shtc3<I, D> {
    i2c: I,
    delay: D,
    address: u8,
}

impl<E, I, D> Shtc3<I, D>
where
    I: I2c<Error = E>,
    D: DelayNs,
{
    /// Create an SHTC3 driver.
    ///
    /// This consumes the I2C bus `I` and the delay provider `D`. The address
    /// will almost always be `SENSOR_ADDRESS` from this crate - the SHTC3 has
    /// no address pins.
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Shtc3 { i2c, delay, address }
    }

    /// Destroy this driver and release the I2C bus `I` and delay provider `D`.
    pub fn destroy(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    /// Check that an SHTC3 is present and responding.
    ///
    /// Reads the ID register and validates its CRC. Success tells you a
    /// device is on the bus and the link is intact; the ID value itself is
    /// not returned, since only a few of its bits are specified (datasheet
    /// section 5.9).
    pub fn is_present(&mut self) -> Result<(), Error<E>> {
        self.send_command(Command::GetId)?;

        let mut id = [0u8; 3];
        self.i2c.read(self.address, &mut id).map_err(Error::I2c)?;

        check_crc(&id[..2], id[2])
    }

    /// Put the sensor into sleep mode.
    ///
    /// While asleep the sensor draws its minimum current but will not accept
    /// measurement commands until woken with [`Shtc3::wakeup`].
    pub fn sleep(&mut self) -> Result<(), Error<E>> {
        self.send_command(Command::Sleep)
    }

    /// Wake the sensor up from sleep mode.
    pub fn wakeup(&mut self) -> Result<(), Error<E>> {
        self.send_command(Command::WakeUp)
    }

    /// Measure temperature and humidity.
    ///
    /// Runs one complete measurement in the given timing and power mode and
    /// returns the converted values. Both the temperature and the humidity
    /// field of the reply carry their own CRC; if either fails to validate,
    /// the whole measurement is rejected with [`Error::InvalidCrc`] and
    /// nothing is returned. See the module documentation for the flow.
    pub fn measure(
        &mut self,
        timing: TimingMode,
        power: PowerMode,
    ) -> Result<Measurement, Error<E>> {
        let command = measure_command(timing, power);

        let raw = match timing {
            TimingMode::Stretched => self.measure_stretched(command)?,
            TimingMode::Polled => self.measure_polled(command)?,
        };

        check_crc(&raw.temperature, raw.temperature_crc)?;
        check_crc(&raw.humidity, raw.humidity_crc)?;

        Ok(Measurement::from_raw(&raw))
    }

    /// One measurement with clock stretching.
    ///
    /// The sensor holds SCL low until the conversion completes, so the read
    /// following the command blocks for exactly as long as needed.
    fn measure_stretched(&mut self, command: [u8; 2]) -> Result<RawMeasurement, Error<E>> {
        self.i2c.write(self.address, &command).map_err(Error::I2c)?;

        self.read_raw()
    }

    /// One measurement in polling mode.
    ///
    /// While converting, the sensor NACKs read headers. We probe with
    /// single-byte reads, waiting 1 ms after each failed probe, and stop
    /// probing on the first ACK. Probe exhaustion is deliberately not an
    /// error: the final 6-byte read is issued regardless and alone decides
    /// whether the measurement succeeds.
    fn measure_polled(&mut self, command: [u8; 2]) -> Result<RawMeasurement, Error<E>> {
        self.i2c.write(self.address, &command).map_err(Error::I2c)?;

        let mut probe = [0u8; 1];
        for _ in 0..MAX_PROBE_ATTEMPTS {
            if self.i2c.read(self.address, &mut probe).is_ok() {
                break;
            }
            self.delay.delay_ms(1);
        }

        self.read_raw()
    }

    /// Read the 6-byte measurement reply and split it into its fields.
    fn read_raw(&mut self) -> Result<RawMeasurement, Error<E>> {
        let mut data = [0u8; 6];
        self.i2c.read(self.address, &mut data).map_err(Error::I2c)?;

        Ok(RawMeasurement::from_bytes(data))
    }

    /// Write one 2-byte command, expecting no reply.
    fn send_command(&mut self, command: Command) -> Result<(), Error<E>> {
        self.i2c
            .write(self.address, &command.bytes())
            .map_err(Error::I2c)
    }
}

/// compute_crc uses the CRCu8 algorithm from crc-any.
///
/// The parameters come from the datasheet, section 5.10:
///
/// > polynomial: 0x31 (x^8 + x^5 + x^4 + 1), initialization: 0xFF
///
/// with no reflection and no final XOR, processing each byte MSB first. The
/// datasheet gives 0xBE 0xEF -> 0x92 as the worked example, which the tests
/// below check. This is the same CRC-8 every Sensirion I2C sensor uses, one
/// checksum byte per 16-bit word on the wire.
fn compute_crc(bytes: &[u8]) -> u8 {
    // Poly (0x31), bits (8), initial (0xff), final_xor (0x00), reflect (false).
    let mut crc = CRCu8::create_crc(0x31, 8, 0xff, 0x00, false);
    crc.digest(bytes);
    crc.get_crc()
}

/// Validate `bytes` against the checksum the sensor sent alongside them.
fn check_crc<E>(bytes: &[u8], expected: u8) -> Result<(), Error<E>> {
    if compute_crc(bytes) != expected {
        return Err(Error::InvalidCrc);
    }

    Ok(())
}
