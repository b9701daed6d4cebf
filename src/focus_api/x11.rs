use anyhow::{anyhow, Result};
use sysinfo::Pid;
use tracing::instrument;
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::{ATOM_ANY, Atom, Drawable, GetProperty, GrabServer, InternAtom, UngrabServer, Window},
    Connection,
};

use super::{app_name_from_path, AppIdentity, FocusSampler};

fn get_pid_atom(conn: &Connection) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name: b"_NET_WM_PID",
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    let result_slice = result.value::<u32>();
    if result_slice.is_empty() {
        return Ok(None);
    }
    Ok(Some(result_slice[0]))
}

fn get_process_exe(id: u32) -> Result<Option<String>> {
    let system = sysinfo::System::new_all();
    let Some(process) = system.process(Pid::from_u32(id)) else {
        return Ok(None);
    };

    Ok(process
        .exe()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string()))
}

fn get_active_window_atom(conn: &Connection) -> Result<Atom> {
    let active_window_atom = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name: b"_NET_ACTIVE_WINDOW",
    }))?;
    Ok(active_window_atom.atom())
}

fn get_active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<Window>()[0])
}

pub struct X11FocusSampler {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    pid_atom: Atom,
}

impl X11FocusSampler {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = get_active_window_atom(&connection)?;
        let pid_atom = get_pid_atom(&connection)?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            pid_atom,
        })
    }

    #[instrument(skip(self))]
    fn sample_inner(&self) -> Result<AppIdentity> {
        let setup = self.connection.get_setup();

        // Currently the application only supports 1 x11 screen.
        let root = setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .unwrap()
            .root();

        let active_window = get_active_window(&self.connection, &root, self.active_window_atom)?;
        let pid = get_pid(&self.connection, active_window, self.pid_atom)?
            .ok_or_else(|| anyhow!("Active window carries no _NET_WM_PID"))?;
        let exe = get_process_exe(pid)?
            .ok_or_else(|| anyhow!("No process found for pid {pid}"))?;
        Ok(AppIdentity {
            app_name: app_name_from_path(&exe),
            app_id: exe.into(),
        })
    }
}

impl FocusSampler for X11FocusSampler {
    #[instrument(skip(self))]
    fn sample(&mut self) -> Result<AppIdentity> {
        assert!(self.preferred_screen >= 0);

        let _ = self.connection.send_request(&GrabServer {});

        let result = self.sample_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }

    #[instrument(skip(self))]
    fn idle_time_ms(&mut self) -> Result<u32> {
        let setup = self.connection.get_setup();
        let root = setup
            .roots()
            .nth(self.preferred_screen as usize)
            .unwrap()
            .root();
        let idle = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(idle)?;
        Ok(reply.ms_since_user_input())
    }
}
