//! Modbus RTU transport over a serial port.

use tokio_modbus::client::{Context, Reader};
use tokio_modbus::prelude::*;
use tokio_serial::{ClearBuffer, SerialPort};

use crate::config::BusConfig;
use crate::reader::{RegisterTransport, TransportError};

/// Errors opening the serial line.
#[derive(Debug, thiserror::Error)]
pub enum RtuError {
    #[error("failed to open serial port {port}: {message}")]
    Open { port: String, message: String },
}

/// Register transport speaking Modbus RTU on one serial line.
///
/// The unit id is switched per request, so one transport serves every meter
/// on the line.
#[derive(Debug)]
pub struct RtuTransport {
    /// `None` between closing and reopening the port in [`RtuTransport::reset`].
    ctx: Option<Context>,
    config: BusConfig,
}

impl RtuTransport {
    /// Open the serial port described by `config`.
    pub fn open(config: &BusConfig) -> Result<Self, RtuError> {
        let serial = open_serial(config)?;

        tracing::info!(
            port = %config.port,
            baud_rate = config.baud_rate,
            parity = %config.parity,
            "Opened serial port"
        );

        Ok(Self {
            ctx: Some(rtu::attach(serial)),
            config: config.clone(),
        })
    }
}

fn open_serial(config: &BusConfig) -> Result<tokio_serial::SerialStream, RtuError> {
    let parity = match config.parity.to_lowercase().as_str() {
        "even" => tokio_serial::Parity::Even,
        "odd" => tokio_serial::Parity::Odd,
        _ => tokio_serial::Parity::None,
    };

    let stop_bits = match config.stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    };

    let data_bits = match config.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };

    let builder = tokio_serial::new(&config.port, config.baud_rate)
        .parity(parity)
        .stop_bits(stop_bits)
        .data_bits(data_bits)
        .timeout(config.timeout());

    tokio_serial::SerialStream::open(&builder).map_err(|e| RtuError::Open {
        port: config.port.clone(),
        message: e.to_string(),
    })
}

impl RegisterTransport for RtuTransport {
    async fn read_holding_registers(
        &mut self,
        unit: u8,
        address: u16,
        words: u16,
    ) -> Result<Vec<u8>, TransportError> {
        if self.ctx.is_none() {
            self.reset().await?;
        }
        let Some(ctx) = self.ctx.as_mut() else {
            return Err(TransportError::Io("serial port not open".to_string()));
        };

        let timeout = self.config.timeout();
        ctx.set_slave(Slave(unit));

        let registers = tokio::time::timeout(timeout, ctx.read_holding_registers(address, words))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|e| TransportError::Io(e.to_string()))?
            .map_err(|e| TransportError::Exception(format!("{:?}", e)))?;

        Ok(registers_to_bytes(&registers))
    }

    /// Close and reopen the port, discarding unread input.
    ///
    /// The framed context may still hold part of the timed-out reply, so it
    /// is replaced along with the stream.
    async fn reset(&mut self) -> Result<(), TransportError> {
        // the port is opened exclusively, close it before reopening
        self.ctx = None;

        let serial = open_serial(&self.config).map_err(|e| TransportError::Io(e.to_string()))?;
        serial
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::Io(e.to_string()))?;

        tracing::debug!(port = %self.config.port, "Reopened serial port");

        self.ctx = Some(rtu::attach(serial));
        Ok(())
    }
}

/// Flatten registers into their wire bytes, high byte first.
fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
    registers.iter().flat_map(|word| word.to_be_bytes()).collect()
}
