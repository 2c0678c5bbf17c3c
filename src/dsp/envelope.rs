use super::nonlinear_map;

/*
Envelope
========

A four-stage ADSR whose segments are straight lines, but whose slopes are
exponential in the parameter value. This gives usable times from a single
sample up to minutes out of a 0..128 knob.

Vocabulary
----------

  level     Output before gain, 0.0 to 1.0. Lives in state word 1.

  stage     Attack, Decay (which settles into sustain) or Release. Lives in
            state word 0, stored as a float so the whole unit state stays a
            plain array that a trigger can zero in one go.

  gate      The voice's sustain flag. Clearing it forces Release from any
            stage, every sample, so the release cannot be interrupted.

  slope     Per-sample level change: 2^(-24·p) for attack, decay and release,
            where p is the parameter normalised to 0..1.


The Shape
---------

  Level
    1.0 ┐   ╱╲
        │  ╱  ╲______________
    S   │ ╱                  ╲
        │╱                    ╲
    0.0 └──────────────────────╲──→ Time
         A   D      (hold)     R

Decay stops at the sustain level and stays there; there is no separate
Sustain stage. A trigger zeroes the state, which lands in Attack at level 0.

    ┌────────┐  level ≥ 1   ┌───────┐
    │ Attack │ ───────────→ │ Decay │ ── level ≤ S: clamp to S
    └────────┘              └───────┘
         │ gate low              │ gate low
         ↓                       ↓
    ┌──────────────────────────────┐
    │ Release: level -= slope, ≥ 0 │
    └──────────────────────────────┘
*/

/// Stage of the envelope state machine, as stored in state word 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Attack,
    Decay,
    Release,
}

impl EnvelopeStage {
    fn from_state(value: f32) -> Self {
        match value as i32 {
            0 => EnvelopeStage::Attack,
            1 => EnvelopeStage::Decay,
            _ => EnvelopeStage::Release,
        }
    }

    fn to_state(self) -> f32 {
        match self {
            EnvelopeStage::Attack => 0.0,
            EnvelopeStage::Decay => 1.0,
            EnvelopeStage::Release => 3.0,
        }
    }
}

/// Normalised envelope parameters.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub gain: f32,
}

impl EnvelopeParams {
    pub fn from_slice(p: &[f32]) -> Self {
        Self {
            attack: p[0],
            decay: p[1],
            sustain: p[2],
            release: p[3],
            gain: p[4],
        }
    }
}

/// Advances the envelope one sample and returns `level · gain`.
pub fn next_sample(state: &mut [f32; 8], gate: bool, params: &EnvelopeParams) -> f32 {
    let mut stage = EnvelopeStage::from_state(state[0]);
    if !gate {
        stage = EnvelopeStage::Release;
    }
    let mut level = state[1];
    match stage {
        EnvelopeStage::Attack => {
            level += nonlinear_map(params.attack);
            if level >= 1.0 {
                level = 1.0;
                stage = EnvelopeStage::Decay;
            }
        }
        EnvelopeStage::Decay => {
            level -= nonlinear_map(params.decay);
            if level <= params.sustain {
                level = params.sustain;
            }
        }
        EnvelopeStage::Release => {
            level -= nonlinear_map(params.release);
            if level <= 0.0 {
                level = 0.0;
            }
        }
    }
    state[0] = stage.to_state();
    state[1] = level;
    level * params.gain
}

/// Current stage, for meters and tests.
pub fn stage(state: &[f32; 8]) -> EnvelopeStage {
    EnvelopeStage::from_state(state[0])
}
