// File: src/platforms/twitch/requests.rs

use serde::Deserialize;

/// Response from the "Get Streams" endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamsResponse {
    pub data: Vec<StreamData>,
}

/// Single stream data record. Only the fields we read.
#[derive(Debug, Deserialize)]
pub struct StreamData {
    pub user_id: String,
    pub user_login: String,
    pub title: String,
    pub started_at: String,
}

/// Response from the "Get Users" endpoint.
#[derive(Debug, Deserialize)]
pub struct UsersResponse {
    pub data: Vec<UserData>,
}

/// Single user record.
#[derive(Debug, Deserialize)]
pub struct UserData {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

/// Response from the OAuth token validation endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenValidation {
    pub client_id: String,
    #[serde(default)]
    pub login: Option<String>,
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_response_parses_helix_payload() {
        let payload = r#"{
            "data": [
                {
                    "id": "41375541868",
                    "user_id": "459331509",
                    "user_login": "auronplay",
                    "user_name": "auronplay",
                    "game_id": "494131",
                    "type": "live",
                    "title": "hablamos y le damos a Little Nightmares 1",
                    "viewer_count": 78365,
                    "started_at": "2021-03-10T15:04:21Z",
                    "language": "es",
                    "thumbnail_url": ""
                }
            ],
            "pagination": {}
        }"#;

        let parsed: StreamsResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].user_id, "459331509");
        assert_eq!(parsed.data[0].user_login, "auronplay");
    }

    #[test]
    fn users_response_parses_helix_payload() {
        let payload = r#"{
            "data": [
                {
                    "id": "141981764",
                    "login": "twitchdev",
                    "display_name": "TwitchDev",
                    "type": "",
                    "broadcaster_type": "partner",
                    "description": "",
                    "profile_image_url": "",
                    "offline_image_url": "",
                    "created_at": "2016-12-14T20:32:28Z"
                }
            ]
        }"#;

        let parsed: UsersResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.data[0].id, "141981764");
        assert_eq!(parsed.data[0].login, "twitchdev");
    }
}
