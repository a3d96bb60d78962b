/// Instruction sent upstream for a user's page description.
pub fn compose(user_prompt: &str) -> String {
    format!(
        "You are an expert web developer specializing in converting natural language descriptions into clean, \
modern HTML and CSS code. Generate valid, well-structured code based on the user's description.

User request: {user_prompt}

Return only a JSON object with two keys:
- html: containing the HTML code
- css: containing the CSS code

The JSON should be properly formatted and valid."
    )
}
