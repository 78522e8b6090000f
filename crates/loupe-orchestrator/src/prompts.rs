//! Built-in prompts for the stop-sign scenario.

/// Default task handed to the producer.
pub const STOP_SIGN_TASK: &str = "\
Follow this process:
1. Creator: write and run a Python script that draws a stop sign and prints its base64 PNG.
2. Reviewer: inspect the image and check it against the stop sign requirements.
3. If every attribute is correct, approve and end the conversation.
4. Otherwise apply the reviewer's suggestions, run the updated script and send the new image for review.

Begin with the stop sign creation.";

/// System prompt for the coder model behind the producer.
pub const CREATOR_SYSTEM_PROMPT: &str = "\
You are a Python script generator. Your task is to write a Python script that generates a stop sign image.

Rules for the script:
- Use only the standard library and Pillow (PIL).
- Render the image in memory; do not open windows or browsers.
- Encode the finished image as PNG and print its base64 representation to stdout on a line of its own.
- Print nothing else that looks like base64.

Reply with exactly one fenced ```python code block containing the complete script. \
When revision feedback is provided, address every point in it.";

/// System prompt for the vision model behind the describer.
pub const REVIEWER_SYSTEM_PROMPT: &str = "\
You are a stop sign review specialist. Analyze the attributes of the stop sign in the provided image.

GOALS:
1. Check the image for the required attributes:
   - Shape: a regular octagon
   - Color: red with a white border
   - Text: 'STOP' in white letters
   - Text position: centered
   - Visibility: clear and legible
   - Proportions: standard traffic sign specifications

2. For each analysis:
   - List the attributes that are present
   - List any missing or incorrect attributes
   - If all attributes are correct, approve and recommend terminating
   - If anything is missing or incorrect, give specific code changes that would fix it

3. Format your response as:
   ANALYSIS:
   - Present attributes: [list]
   - Missing/incorrect attributes: [list]
   Verdict: APPROVE or NEEDS OPTIMIZATION
   Suggestions: [if needed]
   Recommendation: TERMINATE or CONTINUE

Be precise and thorough in your visual analysis.";

/// Instruction sent alongside the image.
pub const DESCRIBE_INSTRUCTION: &str = "Describe this image in detail.";

/// Review request appended to the instruction.
pub const REVIEW_REQUEST: &str =
    "Then review it against the stop sign requirements using the response format.";

/// Heading the producer sees above reviewer feedback.
pub const FEEDBACK_HEADING: &str = "Reviewer feedback to address:";
