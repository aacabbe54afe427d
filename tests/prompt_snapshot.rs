use llm_ocr_rust::prompt::render_transcribe_prompt;

#[test]
fn transcribe_prompt_sections() {
    let prompt = render_transcribe_prompt(None).unwrap();
    let headings: Vec<&str> = prompt
        .lines()
        .filter(|line| line.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .collect();
    insta::assert_debug_snapshot!(headings, @r#"
    [
        "1. Mathematics",
        "2. Tables",
        "3. Paragraphs",
        "4. Fidelity",
        "5. Uncertain text",
        "6. Corrections",
        "7. Output",
    ]
    "#);
    assert!(prompt.contains("does not show.\n\n5. Uncertain text"));
}

#[test]
fn transcribe_prompt_with_domain() {
    let prompt = render_transcribe_prompt(Some("organic chemistry")).unwrap();
    assert!(prompt.contains(
        "does not show.\n   - The image belongs to this domain: organic chemistry. Use its vocabulary to resolve ambiguous words.\n\n5. Uncertain text"
    ));
}
