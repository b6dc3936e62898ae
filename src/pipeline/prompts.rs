//! Prompt text for each pipeline step.
//!
//! System prompts are constants so mock backends in tests can route on them.

use crate::pipeline::steps::NO_OPTIMIZATION_SENTINEL;

pub const THEORY_SYSTEM: &str = "\
You are an expert Electronics and Communication Engineering (ECE) professor specializing in theoretical explanations.

Explain ECE concepts (signal processing, communication systems, digital signal processing, circuit analysis and \
MATLAB practicals) clearly and comprehensively:
1. Start with fundamental definitions and concepts
2. Explain the mathematical foundation clearly
3. Describe real-world applications and significance
4. Include key formulas with explanations
5. Focus on practical understanding for lab implementations

Format your response with clear headings and markdown.";

pub const CODE_SYSTEM: &str = "\
You are an expert MATLAB programmer specializing in Electronics and Communication Engineering practicals.

Generate clear, well-commented MATLAB code that uses a BRUTE-FORCE approach with simple, easy-to-understand logic, \
clear variable names, proper initialization and result display.

CRITICAL REQUIREMENTS:
- Generate ONLY the MATLAB code, nothing else
- Do NOT wrap code in markdown code fences
- Add comments for every significant operation";

pub const OPTIMIZE_SYSTEM: &str = "\
You are an expert MATLAB performance engineer. You review brute-force MATLAB code and either produce an optimized \
version (vectorization, built-in functions, algorithmic improvements) with identical behaviour, or state that no \
significant optimization is possible.";

pub const EXPLAIN_SYSTEM: &str = "\
You are an expert MATLAB instructor specializing in ECE practicals.

Provide clear, step-by-step explanations of MATLAB code: break the code down section by section, explain what each \
part does and why, and connect code operations to the underlying theory. Use numbered sections, student-friendly \
language and markdown formatting.";

pub const REPORT_SYSTEM: &str = "\
You are an expert in creating professional LaTeX documents for academic ECE lab reports.

Generate complete, well-formatted LaTeX that follows standard academic report structure, uses the listings package \
for MATLAB code and amsmath for equations, and compiles in Overleaf without modifications.

Output ONLY valid LaTeX code that can be directly copied to a .tex file.";

pub const TUTOR_SYSTEM: &str = "\
You are a friendly and knowledgeable ECE tutor helping students with MATLAB practicals, signal processing and \
communication systems. Answer the student's current query using the conversation context when it is relevant. \
Be concise, accurate and encouraging, and use markdown with LaTeX math where it helps.";

pub fn theory(topic: &str) -> String {
    format!(
        "Provide a comprehensive theoretical explanation for the following ECE practical topic:

Topic: {topic}

Include:
1. **Introduction**: What is this topic and why is it important?
2. **Fundamental Concepts**: Core principles and definitions
3. **Mathematical Foundation**: Key equations and their meanings
4. **Applications**: Real-world use cases in ECE
5. **Relevance to MATLAB Practical**: How this theory applies to practical implementation

Keep the explanation clear, structured, and suitable for ECE students preparing for practical work."
    )
}

pub fn base_code(topic: &str, theory: Option<&str>) -> String {
    let context = match theory {
        Some(theory) if !theory.trim().is_empty() => {
            format!("\n\nTheoretical Context:\n{}", theory)
        }
        _ => String::new(),
    };

    format!(
        "Generate clear, brute-force MATLAB code for the following ECE practical:

Topic: {topic}{context}

Requirements:
- Use simple, straightforward logic (brute-force approach)
- Add detailed comments explaining each section
- Include proper variable initialization
- Display results with appropriate labels
- Use clear plotting if visualization is needed

IMPORTANT: Generate ONLY the MATLAB code without any markdown code fences or additional text."
    )
}

pub fn optimization(topic: &str, code: &str) -> String {
    format!(
        "Analyze the following brute-force MATLAB code for: {topic}

Brute-Force Code:
{code}

Task:
1. Identify if there are significant optimization opportunities (vectorization, built-in functions, algorithm improvements)
2. If YES, respond with ONLY the optimized MATLAB code, with comments highlighting the optimizations
3. If NO significant optimizations are possible, respond with exactly: {NO_OPTIMIZATION_SENTINEL}

Do NOT wrap the code in markdown code fences. No additional explanation."
    )
}

pub fn explain_code(topic: &str, code: &str) -> String {
    format!(
        "Provide a detailed, step-by-step explanation of the following brute-force MATLAB code for: {topic}

MATLAB Code:
```matlab
{code}
```

Your explanation should cover:
1. **Overview**: Briefly describe what the code accomplishes
2. **Step-by-Step Breakdown**: What each significant section does and why it is needed
3. **Key Concepts**: Important programming concepts or algorithms used
4. **Output/Results**: What output to expect"
    )
}

pub fn explain_optimizations(topic: &str, base_code: &str, optimized_code: &str) -> String {
    format!(
        "Compare and explain the optimizations made in the following MATLAB code for: {topic}

Original Brute-Force Code:
```matlab
{base_code}
```

Optimized Efficient Code:
```matlab
{optimized_code}
```

Explain:
1. **Key Optimizations**: What specific improvements were made?
2. **Why Each Optimization Matters**: How does it improve performance or readability?
3. **Performance Impact**: Estimated improvement in speed or memory usage
4. **When to Use Each Version**: Scenarios where brute-force vs efficient is preferred"
    )
}

pub fn report(
    topic: &str,
    theory: &str,
    final_code: &str,
    code_explanation: &str,
    optimization_notes: &str,
) -> String {
    format!(
        "Generate a complete LaTeX document for an ECE practical lab report on: {topic}

**Theory:**
{theory}

**MATLAB Code (Final Version):**
```matlab
{final_code}
```

**Additional Context:**
- Code Explanation: {code_explanation}
- Optimization Notes: {optimization_notes}

Use \\documentclass[12pt]{{article}} with amsmath, amssymb, graphicx, listings, xcolor and geometry (a4paper, 1in \
margins), a MATLAB lstset style, a title of \"ECE Practical: {topic}\", and the sections Aim, Objective, Theory, \
MATLAB Code, Results, Observation and Conclusion. Results and Observation contain placeholders the student fills in.

Generate ONLY the LaTeX code, nothing else."
    )
}
