#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    /// Key under which the raw argument is stored in `command_args`.
    pub arg_key: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "search",
        action: "lookup",
        arg_key: "query",
    },
    CommandSpec {
        command: "filter",
        action: "set_filter",
        arg_key: "text",
    },
    CommandSpec {
        command: "category",
        action: "set_category",
        arg_key: "category",
    },
    CommandSpec {
        command: "fav",
        action: "toggle_favorite",
        arg_key: "id",
    },
    CommandSpec {
        command: "show",
        action: "show",
        arg_key: "id",
    },
    CommandSpec {
        command: "lang",
        action: "set_language",
        arg_key: "language",
    },
    CommandSpec {
        command: "ask",
        action: "ask",
        arg_key: "message",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
        arg_key: "model",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "scan",
    action: "scan",
    arg_key: "path",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "list",
        action: "list",
        arg_key: "",
    },
    CommandSpec {
        command: "favs",
        action: "show_favorites",
        arg_key: "",
    },
    CommandSpec {
        command: "history",
        action: "history",
        arg_key: "",
    },
    CommandSpec {
        command: "help",
        action: "help",
        arg_key: "",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
        arg_key: "",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
        arg_key: "",
    },
];

pub const SHELL_HELP_COMMANDS: &[&str] = &[
    "/search <product>",
    "/scan <image>",
    "/filter <text>",
    "/category <id>",
    "/favs",
    "/fav <id>",
    "/show <id>",
    "/list",
    "/lang <ru|ky|kk|en|ar>",
    "/ask <question>",
    "/history",
    "/model <name>",
    "/help",
    "/quit",
];
