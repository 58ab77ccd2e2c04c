//! Commands members send and the texts they get back.

// -- Commands --

pub const START: &str = "/start";
pub const REMIND_ME: &str = "Remind me about the meeting";
pub const CHANGE_TIME: &str = "Change time";
pub const STOP_MEETINGS: &str = "Stop meetings";
pub const ACTIVATE: &str = "Join again";
pub const ANY_CITY: &str = "Any city";
pub const ONLY_MY_CITY: &str = "Only my city";
pub const MAKE_MATCHES: &str = "MakeMatches";

// -- Replies --

pub const DEFAULT_REPLY: &str = "I only understand the buttons below";
pub const GREETING_ASK_CITY: &str = "Hi! Which city do you live in?";
pub const WELCOME: &str = "You are now part of Random Coffee.\n\n\
    Every Monday you will get a partner for the week. Write to each other to agree \
    when and where to meet. To see your partner or get a reminder an hour before the \
    meeting, press \"Remind me about the meeting\"";
pub const SORRY_NO_USERNAME: &str =
    "The bot needs a username to work. Set one in your profile and press /start again";
pub const NOT_REGISTERED: &str = "You are not registered yet. Press /start to join";
pub const NO_MEETINGS_THIS_WEEK: &str = "You have no meeting this week";
pub const COULD_NOT_FIND_MATCH: &str = "Sorry, there is no meeting for you this week";
pub const COULD_NOT_PARSE_TIME: &str = "Could not read that time";
pub const TIME_IN_THE_PAST: &str = "That time has already passed!";
pub const PARTNER_REFUSED: &str = "Sorry, your partner cancelled the meeting";
pub const MEETINGS_STOPPED: &str =
    "You will not get new partners. Press \"Join again\" to come back";
pub const INACTIVE_USER: &str =
    "You are not taking part in Random Coffee. To come back, press \"Join again\"";
pub const ALREADY_ACTIVE: &str = "You are already taking part in Random Coffee";
pub const NOW_ACTIVE: &str = "You are taking part in Random Coffee again";
pub const SCOPE_ANY_CITY: &str = "From now on your partner can be from any city";
pub const SCOPE_ONLY_MY_CITY: &str = "From now on your partner will be from your city";
pub const NO_MEETING_IN_YOUR_CITY: &str = "No one from your city was available.";
pub const SOMETHING_WENT_WRONG: &str = "Something went wrong, please try again later";

pub fn this_week_meeting(handle: &str) -> String {
    format!("This week you are meeting @{}", handle)
}

pub fn ask_meeting_time(partner_handle: &str, timezone_known: bool) -> String {
    let mut text = format!(
        "You are meeting @{}. To get a reminder before the meeting, send its time as \
         day.month hours:minutes, for example 02.01 15:04",
        partner_handle
    );
    if !timezone_known {
        text.push_str(". We don't know the time zone of your city, so send the time in UTC");
    }
    text
}

pub fn meeting_with(partner_handle: &str, when: &str) -> String {
    format!("Meeting with @{} on {}", partner_handle, when)
}
