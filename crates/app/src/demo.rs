use std::f32::consts::TAU;

use flame_visualiser_core::{MeshGeometry, SceneModel};

const CANDLES: usize = 5;
const RING_SEGMENTS: usize = 6;
const CANDLE_RADIUS: f32 = 0.05;
const PLACEMENT_RADIUS: f32 = 0.7;
const CAKE_TOP: f32 = 1.6;
const CANDLE_HEIGHT: f32 = 0.5;

/// Stand-in for the birthday cake model: a flat cake top and a `Candle` mesh
/// holding a ring of thin candles with a wick vertex each.
pub fn birthday_cake() -> SceneModel {
    let cake = MeshGeometry::new(
        "Cake",
        ring(0.0, 0.0, 1.2, 16, CAKE_TOP)
            .into_iter()
            .chain(ring(0.0, 0.0, 1.2, 16, 0.0))
            .collect(),
    );

    let mut candle = Vec::new();
    for index in 0..CANDLES {
        let angle = TAU * index as f32 / CANDLES as f32;
        let (cx, cz) = (PLACEMENT_RADIUS * angle.cos(), PLACEMENT_RADIUS * angle.sin());

        candle.extend(ring(cx, cz, CANDLE_RADIUS, RING_SEGMENTS, CAKE_TOP));
        candle.extend(ring(cx, cz, CANDLE_RADIUS, RING_SEGMENTS, CAKE_TOP + CANDLE_HEIGHT));
        candle.push([cx, CAKE_TOP + CANDLE_HEIGHT + 0.05, cz]);
    }

    SceneModel::new(vec![cake, MeshGeometry::new("Candle", candle)])
}

fn ring(cx: f32, cz: f32, radius: f32, segments: usize, y: f32) -> Vec<[f32; 3]> {
    (0..segments)
        .map(|segment| {
            let angle = TAU * segment as f32 / segments as f32;
            [cx + radius * angle.cos(), y, cz + radius * angle.sin()]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flame_visualiser_core::{AnchorConfig, AnchorExtractor};

    #[test]
    fn every_candle_column_yields_one_anchor_at_its_top() {
        let anchors = AnchorExtractor::new(AnchorConfig::default()).from_model(&birthday_cake());

        assert_eq!(anchors.len(), CANDLES * (RING_SEGMENTS + 1));
        for anchor in &anchors {
            assert!(anchor.position().y > CAKE_TOP + CANDLE_HEIGHT);
        }
    }
}
