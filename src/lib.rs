//! Karaoke recording session controller.
//!
//! Plays an instrumental track, captures the singer's microphone in sync
//! with it, keeps a timed lyric line highlighted, and uploads the finished
//! take to a processing backend.
//!
//! # Module map
//!
//! | Module       | Responsibility                                         |
//! |--------------|--------------------------------------------------------|
//! | [`track`]    | Track metadata, lyric parsing, source resolution       |
//! | [`lyrics`]   | Active-line lookup over timed lyric lines              |
//! | [`playback`] | `PlaybackClock` contract + rodio implementation        |
//! | [`capture`]  | Microphone capture, take buffer, WAV encoding          |
//! | [`countdown`]| The 3-2-1 arming countdown                             |
//! | [`session`]  | The state machine tying everything together            |
//! | [`upload`]   | Recording submission to the backend                    |
//! | [`config`]   | Settings structs, TOML persistence, platform paths     |

pub mod capture;
pub mod config;
pub mod countdown;
pub mod lyrics;
pub mod playback;
pub mod session;
pub mod track;
pub mod upload;
