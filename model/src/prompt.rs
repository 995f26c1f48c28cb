/// Instruction text sent ahead of the frames.
pub fn build_prompt(figure_name: &str, observations: &str, frame_count: usize, guidance: &str) -> String {
    format!(
        "You are an expert Artistic Swimming judge. The following {frame_count} images are \
         consecutive moments of the figure '{figure_name}'. Judge's observations: '{observations}'. \
         Score the figure on its three key transitions (T1, T2, T3). \
         Use these judging guidelines: {guidance}. \
         OUTPUT FORMAT IS MANDATORY: begin with the score summary, then exactly one HTML <table> \
         with these six columns in order: Transition, Max NVT, Max PV, Awarded PV, Awarded NVT, \
         Key Observations. Never use Markdown tables. \
         Finish with a 'Deductions' list and a 'What to Improve' list giving numerical PV points."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_request_fields() {
        let prompt = build_prompt("Barracuda", "slight lean at T2", 6, "rubric text");
        assert!(prompt.contains("6 images"));
        assert!(prompt.contains("'Barracuda'"));
        assert!(prompt.contains("'slight lean at T2'"));
        assert!(prompt.contains("rubric text"));
        assert!(prompt.contains("Transition, Max NVT, Max PV, Awarded PV, Awarded NVT, Key Observations"));
    }
}
