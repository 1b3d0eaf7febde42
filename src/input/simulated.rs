use std::time::Duration;

use panel_core::{RoleNames, ScriptedSource, WhenExhausted};
use panel_proto::{ChecksumTable, ComponentKind, FrameBuilder};

/// Pause between scripted frames once the session has played out.
const IDLE: Duration = Duration::from_millis(50);

/// A scripted panel session for trying the CLI without hardware.
///
/// One potentiometer per target reports in, every knob sweeps to a
/// different position, and then confirm is clicked once.
pub fn demo_session(targets: usize, roles: &RoleNames, table: &ChecksumTable) -> ScriptedSource {
    let released = |builder: FrameBuilder| {
        builder
            .master(&roles.confirm, 0.0)
            .master(&roles.decline, 0.0)
            .master_pins(&roles.wheel, 0.0, 0.0)
    };

    let mut frames = Vec::new();
    let discovery = (0..targets).fold(released(FrameBuilder::new()), |builder, i| {
        builder.component(&(i + 1).to_string(), ComponentKind::Potentiometer, "0", 0.0)
    });
    frames.push(discovery.build(table));

    for step in 1..=4u32 {
        let moved = (0..targets).fold(FrameBuilder::new(), |builder, i| {
            let raw = f64::from(step) * 1023.0 / 4.0 / (i as f64 + 1.0);
            builder.component(&(i + 1).to_string(), ComponentKind::Potentiometer, "0", raw.round())
        });
        frames.push(moved.build(table));
    }

    frames.push(FrameBuilder::new().master(&roles.confirm, 1.0).build(table));
    frames.push(FrameBuilder::new().master(&roles.confirm, 0.0).build(table));

    ScriptedSource::new(frames).when_exhausted(WhenExhausted::Idle(IDLE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_core::{FrameDecoder, FrameSource};
    use panel_proto::{Address, RawValue};

    #[test]
    fn test_demo_session_decodes() {
        let table = ChecksumTable::default();
        let roles = RoleNames::default();
        let mut source = demo_session(2, &roles, &table);
        let mut decoder = FrameDecoder::new(table);

        let mut buf = [0u8; 1024];
        while source.pending() > 0 {
            let n = source.read(&mut buf).unwrap();
            decoder.feed(&buf[..n]);
        }

        let snapshot = decoder.snapshot();
        assert_eq!(snapshot.count(ComponentKind::Potentiometer), 2);
        assert_eq!(snapshot.master("Accept"), Some(&RawValue::Scalar(0.0)));
        let knob = Address::new("1", ComponentKind::Potentiometer, "0");
        assert_eq!(snapshot.get(&knob), Some(&RawValue::Scalar(1023.0)));
        assert_eq!(decoder.stats().dropped, 0);
    }
}
