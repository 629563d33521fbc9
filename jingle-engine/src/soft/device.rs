//! Output device selection and the cpal stream that drives a renderer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info, warn};

use crate::backend::{BackendError, BackendResult};
use crate::soft::SoftRenderer;

/// Frames rendered per pass inside the device callback. Longer callbacks are
/// rendered in several passes.
pub const CALLBACK_FRAMES: usize = 1024;

fn backend_err(e: impl std::fmt::Display) -> BackendError {
    BackendError(e.to_string())
}

/// Which device to open and how. `None` fields take the device default.
#[derive(Clone, Debug, Default)]
pub struct DeviceOptions {
    pub device_name: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl DeviceOptions {
    /// The named device, or the host default.
    fn device(&self, host: &cpal::Host) -> BackendResult<cpal::Device> {
        let Some(wanted) = &self.device_name else {
            return host.default_output_device().ok_or_else(|| "no default output device".into());
        };
        host.output_devices()
            .map_err(backend_err)?
            .find(|d| d.name().is_ok_and(|n| n == *wanted))
            .ok_or_else(|| BackendError(format!("no output device named `{wanted}`")))
    }

    /// How far a supported range is from the request: sample rate first,
    /// then channel count.
    fn mismatch(&self, range: &cpal::SupportedStreamConfigRange) -> (u32, u16) {
        let (lo, hi) = (range.min_sample_rate().0, range.max_sample_rate().0);
        let rate = self.sample_rate.map_or(0, |sr| lo.saturating_sub(sr).max(sr.saturating_sub(hi)));
        let channels = self.channels.map_or(0, |c| range.channels().abs_diff(c));
        (rate, channels)
    }

    /// Closest supported config; the device default when nothing is requested.
    fn stream_config(&self, device: &cpal::Device) -> BackendResult<cpal::SupportedStreamConfig> {
        if self.sample_rate.is_none() && self.channels.is_none() {
            return device.default_output_config().map_err(backend_err);
        }
        let range = device
            .supported_output_configs()
            .map_err(backend_err)?
            .min_by_key(|r| self.mismatch(r))
            .ok_or_else(|| BackendError::from("device reports no output configs"))?;
        let rate = match self.sample_rate {
            Some(sr) => sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0),
            None => range.max_sample_rate().0,
        };
        if let Some(sr) = self.sample_rate.filter(|sr| *sr != rate) {
            warn!("{sr} Hz not supported by the device, using {rate} Hz");
        }
        if let Some(ch) = self.channels.filter(|ch| *ch != range.channels()) {
            warn!("{ch} channels not supported by the device, using {}", range.channels());
        }
        Ok(range.with_sample_rate(cpal::SampleRate(rate)))
    }
}

/// Names of the host's output devices.
pub fn output_device_names() -> BackendResult<Vec<String>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for dev in host.output_devices().map_err(backend_err)? {
        names.push(dev.name().map_err(backend_err)?);
    }
    Ok(names)
}

/// Render `output` in scratch-sized passes and convert to the device format.
/// `scratch` holds a whole number of frames.
fn fill<T>(renderer: &mut SoftRenderer, scratch: &mut [f32], output: &mut [T], channels: usize)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    for chunk in output.chunks_mut(scratch.len()) {
        let block = &mut scratch[..chunk.len()];
        renderer.render(block, channels);
        for (o, s) in chunk.iter_mut().zip(block.iter()) {
            *o = T::from_sample(*s);
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut renderer: SoftRenderer,
) -> BackendResult<cpal::Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let channels = usize::from(cfg.channels).max(1);
    let mut scratch = vec![0.0f32; CALLBACK_FRAMES * channels];
    device
        .build_output_stream(
            cfg,
            move |output: &mut [T], _| fill(&mut renderer, &mut scratch, output, channels),
            |e| error!("stream error: {e}"),
            None,
        )
        .map_err(backend_err)
}

/// Open the device, build a renderer for its sample rate and start playing.
pub(crate) fn open_stream(
    options: &DeviceOptions,
    make_renderer: impl FnOnce(f32) -> SoftRenderer,
) -> BackendResult<(cpal::Stream, f32)> {
    let device = options.device(&cpal::default_host())?;
    let supported = options.stream_config(&device)?;
    let sample_format = supported.sample_format();
    let cfg = supported.config();

    #[allow(clippy::cast_precision_loss)]
    let sr = cfg.sample_rate.0 as f32;
    let renderer = make_renderer(sr);
    info!(
        "output device {} ({} ch, {} Hz, {sample_format:?})",
        device.name().unwrap_or_else(|_| "<unnamed>".into()),
        cfg.channels,
        cfg.sample_rate.0
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, renderer)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, renderer)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, renderer)?,
        other => return Err(BackendError(format!("unsupported device sample format: {other:?}"))),
    };
    stream.play().map_err(backend_err)?;
    Ok((stream, sr))
}
