//! Control lines shared by `play` (stdin) and `render` (`--at` scripts).

use anyhow::{anyhow, bail, Context, Result};

use jingle_engine::backend::AudioBackend;
use jingle_engine::{Clock, Player, PlayerHandle, PlayerResult};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Control {
    Volume(f32),
    Tempo(f32),
    Pitch(f32),
    Reverb(f32),
    Start,
    Stop,
    Quit,
}

/// Parse `volume 30`, `tempo=90`, `start`, ...
pub fn parse_control(line: &str) -> Result<Control> {
    let line = line.trim();
    let (key, value) = match line.split_once(|c: char| c == '=' || c.is_whitespace()) {
        Some((k, v)) => (k.trim(), Some(v.trim())),
        None => (line, None),
    };
    let number = || -> Result<f32> {
        let v = value.ok_or_else(|| anyhow!("`{key}` needs a value"))?;
        v.parse::<f32>().with_context(|| format!("bad value for `{key}`: {v}"))
    };
    Ok(match key.to_ascii_lowercase().as_str() {
        "volume" | "vol" => Control::Volume(number()?),
        "tempo" | "bpm" => Control::Tempo(number()?),
        "pitch" | "frequency" | "freq" => Control::Pitch(number()?),
        "reverb" => Control::Reverb(number()?),
        "start" | "play" => Control::Start,
        "stop" => Control::Stop,
        "quit" | "exit" => Control::Quit,
        other => bail!("unknown control `{other}`"),
    })
}

/// A control applied at a render time, written `SECONDS:CONTROL`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScriptedChange {
    pub at: f64,
    pub control: Control,
}

pub fn parse_scripted(s: &str) -> Result<ScriptedChange> {
    let (at, rest) = s.split_once(':').ok_or_else(|| anyhow!("expected SECONDS:CONTROL, got `{s}`"))?;
    let at: f64 = at.trim().parse().with_context(|| format!("bad time in `{s}`"))?;
    if !(at.is_finite() && at >= 0.0) {
        bail!("time must be a non-negative number in `{s}`");
    }
    Ok(ScriptedChange { at, control: parse_control(rest)? })
}

pub fn apply_to_player<B: AudioBackend, C: Clock>(p: &mut Player<B, C>, c: Control) -> PlayerResult {
    match c {
        Control::Volume(v) => p.set_volume(v),
        Control::Tempo(t) => p.set_tempo(t),
        Control::Pitch(hz) => p.set_frequency_multiplier_base(hz),
        Control::Reverb(r) => p.set_reverb(r),
        Control::Start => p.start()?,
        Control::Stop => p.stop(),
        Control::Quit => {}
    }
    Ok(())
}

pub fn apply_to_handle(h: &PlayerHandle, c: Control) -> PlayerResult {
    match c {
        Control::Volume(v) => h.set_volume(v),
        Control::Tempo(t) => h.set_tempo(t),
        Control::Pitch(hz) => h.set_frequency_multiplier_base(hz),
        Control::Reverb(r) => h.set_reverb(r),
        Control::Start => h.start()?,
        Control::Stop => h.stop(),
        Control::Quit => {}
    }
    Ok(())
}
