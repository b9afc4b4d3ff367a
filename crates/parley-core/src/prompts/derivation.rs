//! Single-purpose instructions for short derivation calls (name, case fields, intent).

pub const FIRST_NAME_SYSTEM: &str =
    "Extract only the first name from the given input. If there's no clear first name, return the full input.";

pub const SHORT_DESCRIPTION_SYSTEM: &str =
    "Create a short description of the case that the user wants to open in this transcript in 4 words.";

pub const TRANSLATE_SYSTEM: &str = "Translate all items into English if not already.";

pub const SUMMARY_SYSTEM: &str =
    "Create a short, maximum 2 paragraph summary of this transcript.";

pub const CONTACT_EMAIL_SYSTEM: &str =
    "Generate a random, realistic email address. Produce only the email, no other text or quotation marks at all";

pub const CASE_INTENT_SYSTEM: &str = "Read the conversation transcript. Does the user want a support case opened for them right now? Answer with exactly YES or NO.";
