//! Player backend driving the macOS Music app through `osascript`.
//!
//! Each trait call runs one short AppleScript. Queries print their answer on
//! stdout, one value per line; an empty answer means "absent". AppleScript
//! numbers playlists, tracks and windows from 1, the traits from 0.
//!
//! [`PlayerInfoWatcher`] keeps one long-running JavaScript for Automation
//! process subscribed to the player's `playerInfo` distributed notification;
//! it prints one JSON object per notification.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};
use wait_timeout::ChildExt;

use crate::command_queue::DEFAULT_CALL_TIMEOUT;
use crate::errors::CueError;
use crate::player::{
    ActiveEntry, Bounds, NotificationSource, PlayState, PlayerLibrary, PlayerNotification,
    PlayerStatus, Point, Size, TransportControl, WindowControl, WindowInfo,
};

/// AppleScript key code of Return.
pub const ACTIVATION_KEY_CODE: u16 = 36;

#[derive(Clone, Debug)]
pub struct OsaScriptPlayer {
    application: String,
    main_window_title: String,
    script_timeout: Duration,
}

impl OsaScriptPlayer {
    pub fn new(application: &str, main_window_title: &str) -> Self {
        Self {
            application: application.to_string(),
            main_window_title: main_window_title.to_string(),
            script_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Kills any single script still running after `timeout`.
    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    fn run(&self, script: &str) -> Result<String, CueError> {
        trace!(script, "osascript");
        let mut child = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CueError::automation(&format!("Failed to run osascript: {e}")))?;

        let status = match child.wait_timeout(self.script_timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                warn!(timeout = ?self.script_timeout, "osascript hung, killed");
                return Err(CueError::Timeout(self.script_timeout));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)?;
        }
        if let Some(mut err) = child.stderr.take() {
            err.read_to_string(&mut stderr)?;
        }

        if status.success() {
            Ok(stdout.trim_end_matches(['\n', '\r']).to_string())
        } else {
            Err(classify_failure(&self.application, stderr.trim()))
        }
    }

    /// Wraps `body` in a tell block, failing fast if the app is not running
    /// instead of launching it.
    fn tell_player(&self, body: &str) -> String {
        let app = quote(&self.application);
        format!(
            "if application {app} is not running then error \"not running\" number -600\n\
             tell application {app}\n{body}\nend tell"
        )
    }

    fn tell_process(&self, body: &str) -> String {
        let app = quote(&self.application);
        format!(
            "tell application \"System Events\"\ntell process {app}\n{body}\nend tell\nend tell"
        )
    }

    fn player_script(&self, body: &str) -> Result<String, CueError> {
        self.run(&self.tell_player(body))
    }

    fn process_script(&self, body: &str) -> Result<String, CueError> {
        self.run(&self.tell_process(body))
    }
}

/// Delay before a notification process that died is started again.
const WATCH_RESTART_DELAY: Duration = Duration::from_secs(2);

const PLAYER_INFO_SCRIPT: &str = r#"ObjC.import('Foundation');
ObjC.registerSubclass({
  name: 'PMOCuePlayerInfoObserver',
  methods: {
    'playerInfo:': {
      types: ['void', ['id']],
      implementation: function (notification) {
        var info = notification.userInfo;
        var state = ObjC.unwrap(info.objectForKey('Player State'));
        var name = ObjC.unwrap(info.objectForKey('Name'));
        var line = JSON.stringify({ state: state || '', name: name === undefined ? null : name }) + '\n';
        $.NSFileHandle.fileHandleWithStandardOutput.writeData(
          $(line).dataUsingEncoding($.NSUTF8StringEncoding));
      }
    }
  }
});
var observer = $.PMOCuePlayerInfoObserver.alloc.init;
$.NSDistributedNotificationCenter.defaultCenter.addObserverSelectorNameObject(
  observer, 'playerInfo:', NOTIFICATION_NAME, $());
$.NSRunLoop.currentRunLoop.run;
"#;

#[derive(Debug, Deserialize)]
struct PlayerInfoLine {
    state: String,
    name: Option<String>,
}

/// Source of the player's own `playerInfo` notifications.
#[derive(Debug)]
pub struct PlayerInfoWatcher {
    notification: String,
    child: Mutex<Option<Child>>,
    closed: AtomicBool,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl PlayerInfoWatcher {
    pub fn new(application: &str) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            notification: notification_name(application),
            child: Mutex::new(None),
            closed: AtomicBool::new(false),
            stop_tx,
            stop_rx,
        }
    }

    pub fn notification(&self) -> &str {
        &self.notification
    }

    fn script(&self) -> String {
        let name = serde_json::to_string(&self.notification).unwrap_or_default();
        PLAYER_INFO_SCRIPT.replace("NOTIFICATION_NAME", &name)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn kill_child(&self) {
        let child = self.child.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Runs one notification process until its output ends.
    ///
    /// Returns false once `sink` refused a notification.
    fn stream_once(
        &self,
        sink: &mut dyn FnMut(PlayerNotification) -> bool,
    ) -> Result<bool, CueError> {
        let mut child = Command::new("osascript")
            .args(["-l", "JavaScript", "-e", &self.script()])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child.stdout.take();
        *self.child.lock().unwrap_or_else(|e| e.into_inner()) = Some(child);
        if self.is_closed() {
            self.kill_child();
            return Ok(true);
        }
        info!(notification = %self.notification, "Watching player notifications");

        let mut keep_going = true;
        if let Some(stdout) = stdout {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(error = %err, "Failed to read player notifications");
                        break;
                    }
                };
                let Some(notification) = parse_player_info(&line) else {
                    continue;
                };
                if !sink(notification) {
                    keep_going = false;
                    break;
                }
            }
        }
        self.kill_child();
        Ok(keep_going)
    }
}

impl NotificationSource for PlayerInfoWatcher {
    fn listen(&self, sink: &mut dyn FnMut(PlayerNotification) -> bool) -> Result<(), CueError> {
        while !self.is_closed() {
            if !self.stream_once(sink)? {
                return Ok(());
            }
            if self.is_closed() {
                break;
            }
            warn!("Player notification process ended, restarting");
            if self.stop_rx.recv_timeout(WATCH_RESTART_DELAY).is_ok() {
                break;
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.stop_tx.try_send(());
        self.kill_child();
    }
}

impl Drop for PlayerInfoWatcher {
    fn drop(&mut self) {
        self.kill_child();
    }
}

/// Distributed notification posted by `application` on every state change.
pub(crate) fn notification_name(application: &str) -> String {
    format!("com.apple.{}.playerInfo", application.replace(' ', ""))
}

pub(crate) fn parse_player_info(line: &str) -> Option<PlayerNotification> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<PlayerInfoLine>(line) {
        Ok(info) => Some(PlayerNotification {
            state: PlayState::from_name(&info.state),
            name: info.name.filter(|n| !n.is_empty()),
        }),
        Err(err) => {
            debug!(line, error = %err, "Ignoring malformed player notification");
            None
        }
    }
}

/// Maps an osascript error message to the matching error kind.
pub(crate) fn classify_failure(application: &str, stderr: &str) -> CueError {
    let lower = stderr.to_ascii_lowercase();
    if stderr.contains("(-1743)")
        || stderr.contains("(-1719)")
        || stderr.contains("(-25211)")
        || lower.contains("not allowed")
        || lower.contains("not authorized")
    {
        CueError::PermissionDenied(stderr.to_string())
    } else if stderr.contains("(-600)") || lower.contains("not running") {
        CueError::PlayerNotRunning(application.to_string())
    } else if stderr.contains("(-1728)") {
        // "Can't get playlist 7": usually a stale index.
        CueError::NoSuchObject(stderr.to_string())
    } else {
        CueError::Automation(stderr.to_string())
    }
}

/// AppleScript string literal.
pub(crate) fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn script_index(index: usize) -> usize {
    index + 1
}

fn from_script_index(text: &str) -> Result<usize, CueError> {
    let index: usize = text
        .trim()
        .parse()
        .map_err(|_| CueError::automation(&format!("unexpected index '{text}'")))?;
    index
        .checked_sub(1)
        .ok_or_else(|| CueError::automation("index 0 from AppleScript"))
}

fn parse_lines(output: &str) -> Vec<String> {
    if output.is_empty() {
        return Vec::new();
    }
    output.lines().map(str::to_string).collect()
}

fn parse_number(text: &str) -> Result<f64, CueError> {
    // Some locales print a decimal comma.
    text.trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| CueError::automation(&format!("unexpected number '{text}'")))
}

pub(crate) fn parse_pair(output: &str) -> Result<(i32, i32), CueError> {
    let mut parts = output.split(',').map(|p| {
        p.trim()
            .parse::<f64>()
            .map(|v| v.round() as i32)
            .map_err(|_| CueError::automation(&format!("unexpected pair '{output}'")))
    });
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok((a?, b?)),
        _ => Err(CueError::automation(&format!("unexpected pair '{output}'"))),
    }
}

pub(crate) fn parse_entry(output: &str) -> Result<Option<ActiveEntry>, CueError> {
    if output.is_empty() {
        return Ok(None);
    }
    let mut lines = output.lines();
    let (Some(index), Some(name), Some(kind)) = (lines.next(), lines.next(), lines.next()) else {
        return Err(CueError::automation(&format!(
            "unexpected track description '{output}'"
        )));
    };
    let kind = kind.trim();
    Ok(Some(ActiveEntry {
        index: from_script_index(index)?,
        name: name.to_string(),
        is_video: !(kind.is_empty() || kind.eq_ignore_ascii_case("none")),
    }))
}

const JOIN_LINES: &str = "set AppleScript's text item delimiters to linefeed";
const JOIN_COMMAS: &str = "set AppleScript's text item delimiters to \",\"";

impl PlayerStatus for OsaScriptPlayer {
    fn current_collection(&mut self) -> Result<Option<String>, CueError> {
        let out = self.player_script(
            "try\nreturn name of current playlist\non error\nreturn \"\"\nend try",
        )?;
        Ok((!out.is_empty()).then_some(out))
    }

    fn current_entry(&mut self) -> Result<Option<ActiveEntry>, CueError> {
        let out = self.player_script(
            "try\nset t to current track\non error\nreturn \"\"\nend try\n\
             return ((index of t) as text) & linefeed & (name of t) & linefeed & ((video kind of t) as text)",
        )?;
        parse_entry(&out)
    }

    fn position(&mut self) -> Result<Option<f64>, CueError> {
        let out = self.player_script(
            "try\nreturn (player position) as text\non error\nreturn \"\"\nend try",
        )?;
        if out.is_empty() || out == "missing value" {
            return Ok(None);
        }
        parse_number(&out).map(Some)
    }

    fn play_state(&mut self) -> Result<PlayState, CueError> {
        let out = self.player_script("return (player state) as text")?;
        Ok(PlayState::from_name(&out))
    }
}

impl PlayerLibrary for OsaScriptPlayer {
    fn collection_names(&mut self) -> Result<Vec<String>, CueError> {
        let out = self.player_script(&format!(
            "{JOIN_LINES}\nreturn (name of every playlist) as text"
        ))?;
        Ok(parse_lines(&out))
    }

    fn entry_names(&mut self, collection: usize) -> Result<Vec<String>, CueError> {
        let out = self.player_script(&format!(
            "{JOIN_LINES}\nreturn (name of every track of playlist {}) as text",
            script_index(collection)
        ))?;
        Ok(parse_lines(&out))
    }

    fn entry_count(&mut self, collection: usize) -> Result<usize, CueError> {
        let out = self.player_script(&format!(
            "return (count of tracks of playlist {}) as text",
            script_index(collection)
        ))?;
        out.trim()
            .parse()
            .map_err(|_| CueError::automation(&format!("unexpected count '{out}'")))
    }
}

impl TransportControl for OsaScriptPlayer {
    fn set_position(&mut self, seconds: f64) -> Result<(), CueError> {
        self.player_script(&format!("set player position to {seconds}"))
            .map(drop)
    }

    fn resume(&mut self) -> Result<(), CueError> {
        self.player_script("play").map(drop)
    }

    fn stop(&mut self) -> Result<(), CueError> {
        self.player_script("stop").map(drop)
    }

    fn play_entry(
        &mut self,
        collection: usize,
        entry: usize,
        auto_advance: bool,
    ) -> Result<(), CueError> {
        let once = if auto_advance { "without" } else { "with" };
        self.player_script(&format!(
            "play track {} of playlist {} {once} once",
            script_index(entry),
            script_index(collection)
        ))
        .map(drop)
    }

    fn reveal_entry(&mut self, collection: usize, entry: usize) -> Result<(), CueError> {
        self.player_script(&format!(
            "reveal track {} of playlist {}",
            script_index(entry),
            script_index(collection)
        ))
        .map(drop)
    }

    fn send_activation_key(&mut self) -> Result<(), CueError> {
        self.process_script(&format!(
            "set frontmost to true\nkey code {ACTIVATION_KEY_CODE}"
        ))
        .map(drop)
    }
}

impl WindowControl for OsaScriptPlayer {
    fn main_window_title(&self) -> &str {
        &self.main_window_title
    }

    fn windows(&mut self) -> Result<Vec<WindowInfo>, CueError> {
        let out = self.process_script(&format!(
            "set titles to {{}}\n\
             repeat with w in windows\n\
             set t to name of w\n\
             if t is missing value then set t to \"\"\n\
             set end of titles to t\n\
             end repeat\n\
             {JOIN_LINES}\nreturn titles as text"
        ))?;
        Ok(parse_lines(&out)
            .into_iter()
            .enumerate()
            .map(|(index, title)| WindowInfo {
                index,
                title: (!title.is_empty()).then_some(title),
            })
            .collect())
    }

    fn window_position(&mut self, window: &WindowInfo) -> Result<Point, CueError> {
        let out = self.process_script(&format!(
            "{JOIN_COMMAS}\nreturn (position of window {}) as text",
            script_index(window.index)
        ))?;
        let (x, y) = parse_pair(&out)?;
        Ok(Point { x, y })
    }

    fn window_size(&mut self, window: &WindowInfo) -> Result<Size, CueError> {
        let out = self.process_script(&format!(
            "{JOIN_COMMAS}\nreturn (size of window {}) as text",
            script_index(window.index)
        ))?;
        let (width, height) = parse_pair(&out)?;
        Ok(Size { width, height })
    }

    fn set_window_bounds(&mut self, window: &WindowInfo, bounds: Bounds) -> Result<(), CueError> {
        let n = script_index(window.index);
        self.process_script(&format!(
            "set position of window {n} to {{{}, {}}}\nset size of window {n} to {{{}, {}}}",
            bounds.origin.x, bounds.origin.y, bounds.size.width, bounds.size.height
        ))
        .map(drop)
    }
}
