use crate::filters::{self, Filter};
use crate::tags::{conditionals, inheritance, loops, raw, scoping, Library};

pub(crate) fn get_builtin_libraries() -> Vec<(&'static str, Library, bool)> {
    vec![
        ("defaulttags", get_default_tags(), true),
        ("loadertags", get_loader_tags(), true),
        ("defaultfilters", get_default_filters(), true),
        ("mutabletags", get_mutable_tags(), false),
    ]
}

fn get_default_tags() -> Library {
    let mut rv = Library::new();
    rv.add_tag("if", conditionals::parse_if);
    rv.add_tag("ifequal", conditionals::parse_ifequal);
    rv.add_tag("ifnotequal", conditionals::parse_ifnotequal);
    rv.add_tag("ifchanged", conditionals::parse_ifchanged);
    rv.add_tag("firstof", conditionals::parse_firstof);
    rv.add_tag("for", loops::parse_for);
    rv.add_tag("cycle", loops::parse_cycle);
    rv.add_tag("range", loops::parse_range);
    rv.add_tag("regroup", loops::parse_regroup);
    rv.add_tag("with", scoping::parse_with);
    rv.add_tag("autoescape", scoping::parse_autoescape);
    rv.add_tag("filter", scoping::parse_filter);
    rv.add_tag("spaceless", scoping::parse_spaceless);
    rv.add_tag("comment", scoping::parse_comment);
    rv.add_tag("templatetag", scoping::parse_templatetag);
    rv.add_tag("widthratio", scoping::parse_widthratio);
    rv.add_tag("debug", scoping::parse_debug);
    rv.add_tag("load", scoping::parse_load);
    rv
}

fn get_loader_tags() -> Library {
    let mut rv = Library::new();
    rv.add_tag("block", inheritance::parse_block);
    rv.add_tag("extends", inheritance::parse_extends);
    rv.add_tag("include", inheritance::parse_include);
    rv.add_tag("ssi", inheritance::parse_ssi);
    rv
}

fn get_mutable_tags() -> Library {
    let mut rv = Library::new();
    rv.add_tag("raw", raw::parse_raw);
    rv.add_tag("repeater", raw::parse_repeater);
    rv
}

fn get_default_filters() -> Library {
    let mut rv = Library::new();
    rv.add_filter("safe", Filter::new_safe(filters::safe));
    rv.add_filter("safeseq", Filter::new(filters::safeseq));
    rv.add_filter("escape", Filter::new_safe(filters::escape));
    rv.add_filter("force_escape", Filter::new_safe(filters::force_escape));

    rv.add_filter("add", Filter::new(filters::add));
    rv.add_filter("addslashes", Filter::new_safe(filters::addslashes));
    rv.add_filter("capfirst", Filter::new_safe(filters::capfirst));
    rv.add_filter("center", Filter::new_safe(filters::center));
    rv.add_filter("ljust", Filter::new_safe(filters::ljust));
    rv.add_filter("rjust", Filter::new_safe(filters::rjust));
    rv.add_filter("cut", Filter::new(filters::cut));
    rv.add_filter("default", Filter::new(filters::default));
    rv.add_filter("default_if_none", Filter::new(filters::default_if_none));
    rv.add_filter("dictsort", Filter::new(filters::dictsort));
    rv.add_filter("divisibleby", Filter::new(filters::divisibleby));
    rv.add_filter("escapejs", Filter::new(filters::escapejs));
    rv.add_filter("first", Filter::new(filters::first));
    rv.add_filter("last", Filter::new(filters::last));
    rv.add_filter("fix_ampersands", Filter::new_safe(filters::fix_ampersands));
    rv.add_filter("floatformat", Filter::new_safe(filters::floatformat));
    rv.add_filter("get_digit", Filter::new(filters::get_digit));
    rv.add_filter("join", Filter::new_safe(filters::join));
    rv.add_filter("length", Filter::new_safe(filters::length));
    rv.add_filter("length_is", Filter::new_safe(filters::length_is));
    rv.add_filter("linebreaks", Filter::new_safe(filters::linebreaks));
    rv.add_filter("linebreaksbr", Filter::new_safe(filters::linebreaksbr));
    rv.add_filter("linenumbers", Filter::new_safe(filters::linenumbers));
    rv.add_filter("lower", Filter::new_safe(filters::lower));
    rv.add_filter("upper", Filter::new(filters::upper));
    rv.add_filter("title", Filter::new_safe(filters::title));
    rv.add_filter("make_list", Filter::new_safe(filters::make_list));
    rv.add_filter("removetags", Filter::new(filters::removetags));
    rv.add_filter("striptags", Filter::new(filters::striptags));
    rv.add_filter("slice", Filter::new_safe(filters::slice));
    rv.add_filter("slugify", Filter::new_safe(filters::slugify));
    rv.add_filter("stringformat", Filter::new_safe(filters::stringformat));
    rv.add_filter("truncatewords", Filter::new_safe(filters::truncatewords));
    rv.add_filter("unordered_list", Filter::new_safe(filters::unordered_list));
    rv.add_filter("wordcount", Filter::new_safe(filters::wordcount));
    rv.add_filter("wordwrap", Filter::new_safe(filters::wordwrap));
    rv.add_filter("yesno", Filter::new(filters::yesno));
    #[cfg(feature = "urlencode")]
    {
        rv.add_filter("urlencode", Filter::new(filters::urlencode));
    }
    rv
}
