// SPDX-License-Identifier: GPL-2.0-or-later

//! `DSMSensor`: the uniform capability set every sensor kind presents to
//! the handler and pipeline, regardless of whether it's backed by a
//! serial port, an analog card, ARINC-429, IRIG, or a socket.

use crate::error::Result;
use crate::sample::{SampleRef, SampleTag};

/// Flags passed to `IoDevice::open`. Kept minimal: the bits
/// the pipeline itself branches on, not a full `O_*` mirror.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub read_only: bool,
    pub non_blocking: bool,
}

/// The device-level primitives a sensor's transport exposes: `open`,
/// `read`, optional `ioctl`, `close`. Kernel drivers and RPC clients are
/// opaque byte sources behind this trait; nothing above this layer
/// cares how the bytes arrive.
pub trait IoDevice: Send {
    fn open(&mut self, flags: OpenFlags) -> Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn ioctl(&mut self, _cmd: i32, _buf: &mut [u8]) -> Result<()> {
        Ok(())
    }
    /// Write bytes back out to the device (a remote-serial tap client's
    /// keystrokes are relayed out to the sensor this way). Devices
    /// that are read-only from the pipeline's point of view (e.g. a
    /// one-way multicast feed) keep the default, which rejects writes.
    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(crate::error::NidasError::InvalidParameter(
            "device does not support write".into(),
        ))
    }
    fn close(&mut self) -> Result<()>;
}

/// A sensor's raw-to-engineering-units conversion rule
/// (`process(raw) -> list<processed>`).
pub trait ProcessRule: Send + Sync {
    fn process(&self, raw: &SampleRef) -> Vec<SampleRef>;
}

/// Identity conversion: emits the raw sample unchanged. The default for
/// sensors that don't need engineering-unit conversion (e.g. sensors
/// whose scanf parse already produced floats in final units).
pub struct PassThrough;

impl ProcessRule for PassThrough {
    fn process(&self, raw: &SampleRef) -> Vec<SampleRef> {
        vec![SampleRef::clone(raw)]
    }
}

/// Polymorphic over {serial, analog, ARINC, IRIG, socket-attached} but
/// uniform under this capability set.
pub trait DSMSensor: Send {
    fn open(&mut self) -> Result<()>;
    /// Read whatever is ready and return newly framed samples.
    fn read_samples(&mut self) -> Result<Vec<SampleRef>>;
    fn close(&mut self) -> Result<()>;
    fn process(&self, raw: &SampleRef) -> Vec<SampleRef>;
    fn sample_tags(&self) -> &[SampleTag];
    fn timeout_msecs(&self) -> u64;
    fn reopen_on_failure(&self) -> bool;
    fn name(&self) -> &str;
}

/// A sensor whose framing is handled by a [`crate::scanner::MessageScanner`]
/// over an [`IoDevice`] -- the common case for serial sensors.
pub struct ScannedSensor<D: IoDevice> {
    name: String,
    device: D,
    scanner: crate::scanner::MessageScanner,
    pool: std::sync::Arc<crate::sample::SamplePool>,
    tags: Vec<SampleTag>,
    process_rule: Box<dyn ProcessRule>,
    usec_per_char: f64,
    timeout_msecs: u64,
    reopen_on_failure: bool,
    read_buf: Vec<u8>,
}

impl<D: IoDevice> ScannedSensor<D> {
    pub fn new(
        name: impl Into<String>,
        device: D,
        scanner: crate::scanner::MessageScanner,
        pool: std::sync::Arc<crate::sample::SamplePool>,
        tags: Vec<SampleTag>,
        process_rule: Box<dyn ProcessRule>,
        usec_per_char: f64,
        timeout_msecs: u64,
        reopen_on_failure: bool,
    ) -> Self {
        ScannedSensor {
            name: name.into(),
            device,
            scanner,
            pool,
            tags,
            process_rule,
            usec_per_char,
            timeout_msecs,
            reopen_on_failure,
            read_buf: vec![0u8; 4096],
        }
    }
}

impl<D: IoDevice> DSMSensor for ScannedSensor<D> {
    fn open(&mut self) -> Result<()> {
        self.device.open(OpenFlags {
            read_only: true,
            non_blocking: true,
        })
    }

    fn read_samples(&mut self) -> Result<Vec<SampleRef>> {
        let n = self.device.read(&mut self.read_buf)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        let buf_time = crate::time::Time::now()
            .checked_sub_usecs((n as f64 * self.usec_per_char) as i64);
        Ok(self
            .scanner
            .feed(&self.pool, &self.read_buf[..n], buf_time, self.usec_per_char))
    }

    fn close(&mut self) -> Result<()> {
        self.device.close()
    }

    fn process(&self, raw: &SampleRef) -> Vec<SampleRef> {
        self.process_rule.process(raw)
    }

    fn sample_tags(&self) -> &[SampleTag] {
        &self.tags
    }

    fn timeout_msecs(&self) -> u64 {
        self.timeout_msecs
    }

    fn reopen_on_failure(&self) -> bool {
        self.reopen_on_failure
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SamplePool;
    use crate::scanner::{decode_separator, MessageScanner, Position, ScannerConfig};
    use std::sync::Arc;

    struct FixedDevice {
        data: Vec<u8>,
        served: bool,
    }

    impl IoDevice for FixedDevice {
        fn open(&mut self, _flags: OpenFlags) -> Result<()> {
            Ok(())
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.served {
                return Ok(0);
            }
            self.served = true;
            let n = self.data.len().min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            Ok(n)
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn scanned_sensor_produces_framed_samples() {
        let pool = SamplePool::new();
        let scanner = MessageScanner::new(ScannerConfig {
            separator: decode_separator(r"\n"),
            position: Position::Eom,
            message_length: 0,
            null_terminate: false,
            max_sample_size: 1024,
        });
        let device = FixedDevice {
            data: b"a,b\nc,d\n".to_vec(),
            served: false,
        };
        let mut sensor = ScannedSensor::new(
            "test0",
            device,
            scanner,
            pool,
            vec![SampleTag::new(crate::sample::SampleId(1), 1.0)],
            Box::new(PassThrough),
            1.0,
            0,
            false,
        );
        sensor.open().unwrap();
        let samples = sensor.read_samples().unwrap();
        assert_eq!(samples.len(), 2);
        let processed: Vec<_> = samples.iter().flat_map(|s| sensor.process(s)).collect();
        assert_eq!(processed.len(), 2);
    }
}
