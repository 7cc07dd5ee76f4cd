const UNCONSTRAINED_FALLBACK_M: f64 = 720.0;

/// One radius per coordinate; missing entries reuse the last supplied value.
pub(super) fn encode_radiuses(count: usize, radiuses: &[f64]) -> String {
    let default = radiuses
        .last()
        .copied()
        .unwrap_or(UNCONSTRAINED_FALLBACK_M)
        .max(0.0);

    (0..count)
        .map(|idx| {
            let radius = radiuses.get(idx).copied().unwrap_or(default).max(0.0);
            format!("{:.1}", radius)
        })
        .collect::<Vec<_>>()
        .join(";")
}
